//! Pure Rust SSH implementation for dropship.
//!
//! Remote commands and file uploads run over russh, so the tool needs no
//! `ssh`, `scp` or `sshpass` binaries on the machine that deploys.
//!
//! ## Modules
//!
//! - [`client`] - SSH connection management and authentication
//! - [`config`] - Connection settings and host key policy
//! - [`exec`] - Remote command execution
//! - [`sftp`] - File transfer via SFTP

mod client;
pub mod config;
mod exec;
mod sftp;

// Re-exports for public API
pub use client::SshClient;
pub use config::SshConfig;
pub use exec::CommandOutput;
