pub mod chain;
pub mod handlers;

pub use chain::{
    ChainKind, ChainPolicy, PowerChains, PowerEvent, Priority, RegistrationHandle, RestartMode,
};
pub use handlers::{
    register_ec_handlers, register_kernel_fallback, register_restart_poweroff, EcPowerHandlers,
};
