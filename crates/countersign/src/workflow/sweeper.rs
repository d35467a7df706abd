/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Periodic expiry sweep.
//!
//! Lazy expiry on read is authoritative; the sweeper only keeps listings and
//! downstream consumers from seeing long-dead delegations as live.

use super::engine::DelegationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns a task that calls [`DelegationEngine::expire_overdue`] every
/// `interval` until `shutdown` is cancelled.
pub fn spawn_expiry_sweeper(
    engine: Arc<DelegationEngine>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.expire_overdue().await {
                        Ok(0) => {}
                        Ok(count) => tracing::debug!(count, "Expired overdue delegations"),
                        Err(e) => tracing::warn!("Expiry sweep failed: {}", e),
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::debug!("Stopping expiry sweeper");
                    break;
                }
            }
        }
    })
}
