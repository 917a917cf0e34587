//! # Application State
//!
//! Shared state handed to every HTTP handler: the loaded configuration, the
//! address of the one router actor, and the server start time. Everything in
//! here is cheap to clone; the router address is just a mailbox handle.

use crate::config::AppConfig;
use crate::proxy::router::ProxyRouter;
use actix::Addr;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    config: AppConfig,
    router: Addr<ProxyRouter>,
    start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, router: Addr<ProxyRouter>) -> Self {
        Self {
            config,
            router,
            start_time: Instant::now(),
        }
    }

    pub fn router(&self) -> &Addr<ProxyRouter> {
        &self.router
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
