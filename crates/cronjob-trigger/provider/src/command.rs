use std::collections::BTreeMap;

use cronjob_trigger_api::consts::EVENT_NAMESPACE;

use crate::Result;

pub const FUNCTION_PORT: u16 = 8080;

/// The shell command a scheduled job runs to invoke a function once.
#[derive(Clone, Debug)]
pub struct InvocationCommand<'a> {
    pub function_name: &'a str,
    pub namespace: &'a str,
    pub cluster_domain: &'a str,
    pub payload: &'a BTreeMap<String, String>,
}

impl<'a> InvocationCommand<'a> {
    /// Event headers, in the order they are emitted.
    ///
    /// `$(POD_UID)` is expanded by the kubelet from the container env;
    /// `$(date ...)` is expanded by the shell at invocation time.
    const HEADERS: [(&'static str, &'static str); 5] = [
        ("Event-Id", "$(POD_UID)"),
        ("Event-Time", "$(date --rfc-3339=seconds --utc)"),
        ("Event-Namespace", EVENT_NAMESPACE),
        ("Event-Type", "application/json"),
        ("Content-Type", "application/json"),
    ];

    pub fn endpoint(&self) -> String {
        let Self {
            function_name,
            namespace,
            cluster_domain,
            ..
        } = self;
        format!("http://{function_name}.{namespace}.svc.{cluster_domain}:{FUNCTION_PORT}")
    }

    pub fn build(&self) -> Result<String> {
        let mut command = String::from("curl -Lv");
        for (key, value) in Self::HEADERS {
            command.push_str(&format!(" -H \"{key}: {value}\""));
        }

        command.push(' ');
        command.push_str(&self.endpoint());

        if !self.payload.is_empty() {
            // map keys are already sorted, so equal payloads encode equally
            let payload = ::serde_json::to_string(self.payload)?;
            command.push_str(&format!(" -d '{}'", payload.replace('\'', r"'\''")));
        }
        Ok(command)
    }
}
