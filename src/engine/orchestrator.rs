//! Multi-account orchestrator.
//!
//! Starts one scheduler per enabled account, staggered so sessions do not
//! open in lockstep. Each account runs under its own supervisor: a panic
//! or early exit restarts that account only, after
//! `account_restart_delay_ms`. Accounts share nothing mutable.

use anyhow::{anyhow, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};

use super::scheduler::AccountScheduler;
use crate::api::frenzy::FrenzyClient;
use crate::config::{AccountProfile, ApiConfig, AppConfig};
use crate::session::socket::WsTransport;
use crate::types::AccountContext;

pub struct Orchestrator {
    config: AppConfig,
    profiles: Vec<AccountProfile>,
}

impl Orchestrator {
    /// Resolve every enabled account. Fails when none can be started.
    pub fn new(config: AppConfig) -> Result<Self> {
        let profiles = config.resolve_accounts()?;
        Ok(Self { config, profiles })
    }

    pub fn accounts(&self) -> &[AccountProfile] {
        &self.profiles
    }

    /// Run all accounts against the live game service, restarting
    /// everything after a top-level failure.
    pub async fn run_forever(&self) {
        let api = self.config.api.clone();
        self.run_forever_with(move |profile| run_account(api.clone(), profile))
            .await
    }

    /// [`run_with`](Self::run_with) in a loop, `restart_delay_ms` apart.
    pub async fn run_forever_with<F, Fut>(&self, launch: F)
    where
        F: Fn(AccountProfile) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let delay = Duration::from_millis(self.config.orchestrator.restart_delay_ms);
        loop {
            match self.run_with(launch.clone()).await {
                Ok(()) => warn!("All account tasks stopped"),
                Err(e) => error!(error = %format!("{e:#}"), "Orchestrator failed"),
            }
            info!(restart_in_secs = delay.as_secs(), "Restarting all accounts");
            sleep(delay).await;
        }
    }

    /// Launch one supervised task per account via `launch`, the n-th
    /// account starting `n * start_stagger_ms` in.
    ///
    /// Returns an error as soon as any supervisor crashes; the remaining
    /// supervisors and their accounts are aborted on return.
    pub async fn run_with<F, Fut>(&self, launch: F) -> Result<()>
    where
        F: Fn(AccountProfile) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let stagger = Duration::from_millis(self.config.orchestrator.start_stagger_ms);
        let restart = Duration::from_millis(self.config.orchestrator.account_restart_delay_ms);
        info!(accounts = self.profiles.len(), "Starting account schedulers");

        let mut supervisors = JoinSet::new();
        for (i, profile) in self.profiles.iter().enumerate() {
            let offset = stagger * i as u32;
            supervisors.spawn(supervise(profile.clone(), launch.clone(), offset, restart));
        }

        while let Some(joined) = supervisors.join_next().await {
            if let Err(e) = joined {
                return Err(anyhow!("account supervisor crashed: {e}"));
            }
        }
        Err(anyhow!("all account supervisors stopped"))
    }
}

/// Keep one account running, restarting it after `restart` whenever its
/// task returns, fails, or panics.
async fn supervise<F, Fut>(profile: AccountProfile, launch: F, offset: Duration, restart: Duration)
where
    F: Fn(AccountProfile) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if !offset.is_zero() {
        sleep(offset).await;
    }
    let label = profile.label.clone();
    info!(account = %label, "Launching account");
    loop {
        let span = info_span!("account", label = %label);
        // A JoinSet aborts the account task if the supervisor is dropped.
        let mut task = JoinSet::new();
        task.spawn(launch(profile.clone()).instrument(span));

        match task.join_next().await {
            Some(Ok(Ok(()))) => warn!(account = %label, "Account task exited"),
            Some(Ok(Err(e))) => {
                error!(account = %label, error = %format!("{e:#}"), "Account task failed")
            }
            Some(Err(e)) if e.is_panic() => error!(account = %label, "Account task panicked"),
            Some(Err(e)) => {
                warn!(account = %label, error = %e, "Account task cancelled");
                return;
            }
            None => return,
        }

        info!(account = %label, restart_in_secs = restart.as_secs(), "Restarting account");
        sleep(restart).await;
    }
}

/// Build the live clients for one account and run its scheduler.
pub async fn run_account(api: ApiConfig, profile: AccountProfile) -> Result<()> {
    let client = FrenzyClient::new(
        &api.base_url,
        &api.origin,
        &profile.token,
        Duration::from_secs(api.request_timeout_secs),
    )?;
    let transport = WsTransport::new(&api.ws_url);
    let ctx = AccountContext::new(profile.label, profile.token, profile.settings);

    AccountScheduler::new(ctx, client, transport)
        .run_forever()
        .await;
    Ok(())
}
