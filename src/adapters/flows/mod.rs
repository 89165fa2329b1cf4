//! Flow definition adapters.

mod file_tree_flow_repository;

pub use file_tree_flow_repository::FileTreeFlowRepository;
