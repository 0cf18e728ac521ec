//! The state-convergence engine.
//!
//! Bounded cooperative polling: a probe loop re-reads a resource until its
//! state matches the target, yielding between probes, while
//! `tokio::time::timeout` holds the deadline. When the deadline fires the
//! loop future is dropped, so no further probe is ever issued; an in-flight
//! probe is simply abandoned with it.

use std::{future::Future, time::Duration};

use tokio::time;

use crate::{
    api::{Provider, Vm, VmState, Volume, VolumeState},
    config::STATE_PROBE_INTERVAL,
    StratusError, StratusResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Waits until the VM identified by `id` reaches `target`, probing
/// cooperatively, and returns the first record observed in that state.
///
/// Probe failures (*not-found*, *backend-failure*) propagate immediately
/// without retry. When `timeout` elapses first, the wait returns
/// [`StratusError::Timeout`] and the probe loop is no longer running.
/// Concurrent waits on the same id are independent.
pub async fn wait_vm_state<P: Provider + ?Sized>(
    provider: &P,
    id: &str,
    target: VmState,
    timeout: Duration,
) -> StratusResult<Vm> {
    converge(
        || provider.get_vm(id),
        move |vm: &Vm| vm.state == target,
        timeout,
        format!("wait vm state timeout: {} never reached {}", id, target),
    )
    .await
}

/// Waits until the volume identified by `id` reaches `target`. Same
/// semantics as [`wait_vm_state`].
pub async fn wait_volume_state<P: Provider + ?Sized>(
    provider: &P,
    id: &str,
    target: VolumeState,
    timeout: Duration,
) -> StratusResult<Volume> {
    converge(
        || provider.get_volume(id),
        move |volume: &Volume| volume.state == target,
        timeout,
        format!(
            "wait volume state timeout: {} never reached {}",
            id, target
        ),
    )
    .await
}

/// Waits until the VM identified by `id` no longer resolves, polling every
/// 100 ms. Used after deleting a gateway VM so dependent teardown only
/// proceeds once the instance is really gone.
pub async fn wait_vm_gone<P: Provider + ?Sized>(
    provider: &P,
    id: &str,
    timeout: Duration,
) -> StratusResult<()> {
    let poll = async {
        loop {
            match provider.get_vm(id).await {
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err),
                Ok(_) => time::sleep(crate::config::DELETION_PROBE_INTERVAL).await,
            }
        }
    };

    match time::timeout(timeout, poll).await {
        Ok(result) => result,
        Err(_) => Err(StratusError::Timeout(format!(
            "wait vm deletion timeout: {} still resolves",
            id
        ))),
    }
}

/// Runs a single-outstanding-probe loop racing a deadline.
///
/// The deadline is checked ahead of each probe, so an elapsed timeout wins
/// the race even when a probe could succeed instantly. A deadline firing
/// mid-probe drops the in-flight probe with the loop.
async fn converge<T, F, Fut, C>(
    mut probe: F,
    reached: C,
    timeout: Duration,
    timeout_msg: String,
) -> StratusResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StratusResult<T>>,
    C: Fn(&T) -> bool,
{
    let deadline = time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            _ = &mut deadline => return Err(StratusError::Timeout(timeout_msg)),
            result = probe() => {
                let record = result?;
                if reached(&record) {
                    return Ok(record);
                }
            }
        }
        time::sleep(STATE_PROBE_INTERVAL).await;
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn test_converge_returns_first_matching_record() -> anyhow::Result<()> {
        let probes = Arc::new(AtomicU32::new(0));
        let counter = probes.clone();

        let value = converge(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { crate::StratusResult::Ok(n) }
            },
            |n| *n >= 3,
            Duration::from_secs(5),
            "unreachable".into(),
        )
        .await?;

        assert_eq!(value, 3);
        assert_eq!(probes.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_converge_propagates_probe_errors_without_retry() {
        let probes = Arc::new(AtomicU32::new(0));
        let counter = probes.clone();

        let result: StratusResult<u32> = converge(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(StratusError::not_found("vm", "vm-1")) }
            },
            |_| true,
            Duration::from_secs(5),
            "unreachable".into(),
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_converge_times_out_and_stops_probing() {
        let probes = Arc::new(AtomicU32::new(0));
        let counter = probes.clone();

        let result: StratusResult<u32> = converge(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { crate::StratusResult::Ok(0) }
            },
            |_| false,
            Duration::from_millis(250),
            "wait vm state timeout".into(),
        )
        .await;

        assert!(result.unwrap_err().is_timeout());

        // The loop future was dropped with the deadline; probing has ended.
        let settled = probes.load(Ordering::SeqCst);
        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(probes.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_timeout() {
        // The deadline wins the race even when the first probe would match.
        let result: StratusResult<u32> = converge(
            || async { crate::StratusResult::Ok(0) },
            |_| true,
            Duration::from_secs(0),
            "wait vm state timeout".into(),
        )
        .await;
        assert!(result.unwrap_err().is_timeout());
    }
}
