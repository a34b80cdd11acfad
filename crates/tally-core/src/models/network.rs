use std::sync::{Mutex, OnceLock};

pub const POLICY_ENV: &str = "TALLY_NETWORK_POLICY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkPolicy {
    Allow,
    Deny(String),
}

fn state() -> &'static Mutex<NetworkPolicy> {
    static STATE: OnceLock<Mutex<NetworkPolicy>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(NetworkPolicy::Allow))
}

/// Scoped override of the process-wide network policy; the previous
/// policy is restored on drop.
pub struct NetworkPolicyGuard {
    previous: NetworkPolicy,
}

impl NetworkPolicyGuard {
    pub fn set(policy: NetworkPolicy) -> Self {
        let mut s = state().lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *s, policy);
        Self { previous }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::set(NetworkPolicy::Deny(reason.into()))
    }
}

impl Drop for NetworkPolicyGuard {
    fn drop(&mut self) {
        if let Ok(mut s) = state().lock() {
            *s = self.previous.clone();
        }
    }
}

pub fn check_outbound(target: &str) -> Result<(), String> {
    match effective_policy() {
        NetworkPolicy::Allow => Ok(()),
        NetworkPolicy::Deny(reason) => Err(format!(
            "outbound network blocked by policy (target={}): {}",
            target, reason
        )),
    }
}

fn effective_policy() -> NetworkPolicy {
    if let Ok(raw) = std::env::var(POLICY_ENV) {
        if raw.trim().eq_ignore_ascii_case("deny") {
            return NetworkPolicy::Deny(format!("{}=deny", POLICY_ENV));
        }
    }
    state().lock().unwrap_or_else(|e| e.into_inner()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(network_policy)]
    fn scoped_deny_blocks_and_restores() {
        std::env::remove_var(POLICY_ENV);
        let guard = NetworkPolicyGuard::deny("test deny");
        let err = check_outbound("test-target").unwrap_err();
        assert!(err.contains("outbound network blocked by policy"));
        assert!(err.contains("test-target"));
        drop(guard);
        check_outbound("test-target").unwrap();
    }

    #[test]
    #[serial(network_policy)]
    fn env_deny_overrides_scoped_allow() {
        let previous = std::env::var(POLICY_ENV).ok();
        let _guard = NetworkPolicyGuard::set(NetworkPolicy::Allow);
        std::env::set_var(POLICY_ENV, "deny");
        let err = check_outbound("env-target").unwrap_err();
        assert!(err.contains("TALLY_NETWORK_POLICY=deny"));
        match previous {
            Some(v) => std::env::set_var(POLICY_ENV, v),
            None => std::env::remove_var(POLICY_ENV),
        }
    }
}
