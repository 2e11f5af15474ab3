#[cfg(feature = "domain")]
pub mod domain;
#[cfg(feature = "manager")]
pub mod informer;
#[cfg(feature = "manager")]
pub mod manager;
