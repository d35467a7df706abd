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

//! Caller-driven cancellation.

use crate::error::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Runs `future` until it finishes or `token` fires.
///
/// On cancellation the future is dropped, which aborts any in-flight HTTP
/// request at the transport layer, and [`Error::Cancelled`] is returned.
pub async fn run_cancellable<F, T>(token: Option<&CancellationToken>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(token) = token else {
        return future.await;
    };
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("Operation cancelled by caller");
            Err(Error::Cancelled)
        }
        result = future => result,
    }
}
