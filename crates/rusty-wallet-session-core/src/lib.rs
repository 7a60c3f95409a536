pub mod balance;
pub mod domain;
pub mod facade;
pub mod ports;
pub mod registry;
pub mod store;

pub use domain::{
    format_native_amount, BalanceRequestContext, ChainId, ChainMetadata, ChainSummary,
    NativeCurrency, Session, SessionConfig, SessionStatus,
};
pub use facade::{connect_failure_message, short_display, SessionFacade};
pub use ports::{
    EventHandler, ProviderEvent, ProviderEventKind, ProviderPort, RpcPort, StorePort,
    SubscriptionHandle, SubscriptionRegistry, WalletError, CODE_REQUEST_PENDING,
    CODE_UNRECOGNIZED_CHAIN, CODE_USER_REJECTED,
};
pub use registry::ChainRegistry;
pub use store::{SessionStore, LAST_ADDRESS_KEY};
