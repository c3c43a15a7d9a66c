pub mod etcd;
pub mod memory;
pub mod registry_store;
pub mod types;

pub use etcd::EtcdMetaStore;
pub use memory::MemoryMetaStore;
pub use registry_store::RegistryStore;
pub use types::MetaStore;
