pub mod cronjob_trigger;
pub mod function;

pub mod consts {
    pub const GROUP: &str = "kubeless.io";
    pub const VERSION: &str = "v1beta1";

    /// Value of the `Event-Namespace` header sent on every invocation.
    pub const EVENT_NAMESPACE: &str = "cronjobtrigger.kubeless.io";
}
