use super::AstraAdmin;
use crate::astra_api::{HostResult, SecurityPackApi};
use crate::error::{AutomationError, AutomationResult};
use crate::guard;
use crate::protocol::{ActiveUserInfo, LogonResult, SecurityPolicy};
use tracing::info;

impl AstraAdmin {
    fn security_call<T: Default>(
        &self,
        operation: &str,
        call: impl FnOnce(&dyn SecurityPackApi) -> HostResult<T>,
    ) -> AutomationResult<T> {
        let Some(security) = &self.security else {
            return Ok(T::default());
        };
        let outcome = {
            let _sync = self.shared.lock_registry();
            call(security.as_ref())
        };
        guard::get_or_default(self.config.error_mode, operation, outcome)
    }

    fn require_security(&self) -> AutomationResult<&dyn SecurityPackApi> {
        self.security
            .as_deref()
            .ok_or(AutomationError::SecurityPackUnavailable)
    }

    pub fn is_security_pack_active(&self) -> AutomationResult<bool> {
        self.security_call("IsSecurityPackActive", |security| {
            security.is_security_pack_active()
        })
    }

    pub fn is_logged_in(&self) -> AutomationResult<bool> {
        self.security_call("IsLoggedIn", |security| security.is_logged_in())
    }

    /// Checks credentials with the security pack; only an accepted logon is passed on to the
    /// main application, which makes it effective.
    pub fn validate_logon(
        &self,
        user_id: &str,
        password: &str,
        domain: &str,
    ) -> AutomationResult<LogonResult> {
        let Some(security) = &self.security else {
            return Ok(LogonResult::default());
        };
        let outcome = {
            let _sync = self.shared.lock_registry();
            match security.validate_logon(user_id, password, domain) {
                Ok(Some(result)) if result.is_valid => {
                    self.host.validate_logon(user_id, password, domain)
                }
                Ok(Some(result)) => Ok(result),
                Ok(None) => Ok(LogonResult::default()),
                Err(err) => Err(err),
            }
        };
        let result = guard::get_or_default(self.config.error_mode, "ValidateLogon", outcome)?;
        info!(user_id, domain, accepted = result.is_valid, "logon validated");
        Ok(result)
    }

    pub fn active_user(&self) -> AutomationResult<ActiveUserInfo> {
        let user = self.security_call("GetActiveUserInfo", |security| {
            security.active_user_info()
        })?;
        if user.is_anonymous() {
            return Ok(ActiveUserInfo::default());
        }
        Ok(user)
    }

    pub fn security_policy(&self) -> AutomationResult<SecurityPolicy> {
        self.security_call("GetSecurityPolicy", |security| security.security_policy())
    }

    /// Points the security pack at its database and switches it on.
    pub fn enable_security_pack(
        &self,
        database_name: &str,
        user_id: &str,
        password: &str,
    ) -> AutomationResult<bool> {
        let security = self.require_security()?;
        let mode = self.config.error_mode;
        let _sync = self.shared.lock_registry();
        let connected = guard::executed(
            mode,
            "SetupDatabaseConnection",
            security.setup_database_connection(database_name, user_id, password),
        )?;
        if !connected {
            return Ok(false);
        }
        let enabled = guard::executed(mode, "EnableSecurityPack", security.enable_security_pack(true))?;
        if enabled {
            info!(database_name, "security pack enabled");
        }
        Ok(enabled)
    }

    pub fn disable_security_pack(&self) -> AutomationResult<bool> {
        let security = self.require_security()?;
        let _sync = self.shared.lock_registry();
        guard::executed(
            self.config.error_mode,
            "EnableSecurityPack",
            security.enable_security_pack(false),
        )
    }
}
