pub mod crawl;
pub mod extract;
pub mod init;
