pub mod cache;
pub mod deployments;
pub mod kubernetes;
pub mod lab;
pub mod logs;
pub mod status;
pub mod storage;
pub mod terraform;
pub mod workspaces;
