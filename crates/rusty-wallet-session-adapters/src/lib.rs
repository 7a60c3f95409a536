pub mod config;
pub mod deterministic;
pub mod eip1193;
pub mod keyvalue;
pub mod rpc;

pub use config::AdapterConfig;
pub use deterministic::{DeterministicProvider, RecordedCall};
pub use eip1193::Eip1193ProxyGateway;
pub use keyvalue::MemoryStoreAdapter;
pub use rpc::HttpRpcAdapter;
