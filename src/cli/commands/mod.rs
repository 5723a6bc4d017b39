pub mod check;
pub mod deploy;
pub mod init;
pub mod plan;
