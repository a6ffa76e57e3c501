use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;

use crate::error::StoreError;

/// Default in-flight cap for bulk deletes.
pub const MAX_ACTIVE_DELETES: usize = 1000;

/// Default refill threshold: the next wave starts only once the current one
/// has fully drained.
pub const MAX_ACTIVE_DELETES_FOR_CONTINUE: usize = 0;

/// Drives `total` single-item operations with a bounded in-flight request
/// set.
///
/// At most `max_active` operations run simultaneously. `continue_threshold`
/// controls refill: when an operation completes and the in-flight count is
/// at or below the threshold, new operations are started until the cap is
/// reached again. A threshold of `0` therefore produces strict waves of
/// `max_active`, each draining completely before the next starts; a
/// threshold of `max_active - 1` or more issues a replacement the instant
/// any single operation completes. `on_progress` fires after every
/// successful completion. The first error aborts the drive: no further
/// operations are started and the error is returned.
pub(crate) async fn drive_bounded<F, Fut>(
    total: usize,
    max_active: usize,
    continue_threshold: usize,
    mut start: F,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<(), StoreError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    if max_active == 0 {
        return Err(StoreError::InvalidArgument(
            "max_active must be greater than zero".to_string(),
        ));
    }
    if total == 0 {
        return Ok(());
    }

    let mut issued = 0usize;
    let mut completed = 0usize;
    let mut active = FuturesUnordered::new();

    let mut fill = |issued: &mut usize, active: &mut FuturesUnordered<Fut>| {
        while *issued < total && active.len() < max_active {
            active.push(start(*issued));
            *issued += 1;
        }
    };

    fill(&mut issued, &mut active);

    while let Some(result) = active.next().await {
        result?;
        completed += 1;
        on_progress(completed as u64, total as u64);
        if completed >= total {
            break;
        }
        if active.len() <= continue_threshold {
            fill(&mut issued, &mut active);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Issue log entry: (item index, completions observed at issue time).
    async fn run_logged(
        total: usize,
        max_active: usize,
        continue_threshold: usize,
    ) -> Vec<(usize, usize)> {
        let log = RefCell::new(Vec::new());
        let completed = RefCell::new(0usize);
        drive_bounded(
            total,
            max_active,
            continue_threshold,
            |index| {
                log.borrow_mut().push((index, *completed.borrow()));
                async { Ok(()) }
            },
            |done, _total| *completed.borrow_mut() = done as usize,
        )
        .await
        .expect("drive failed");
        log.into_inner()
    }

    #[tokio::test]
    async fn strict_waves_drain_fully_before_refilling() {
        let log = run_logged(2500, 1000, 0).await;
        assert_eq!(log.len(), 2500);
        // Second and third waves begin only after the prior wave completed.
        assert_eq!(log[0], (0, 0));
        assert_eq!(log[999], (999, 0));
        assert_eq!(log[1000], (1000, 1000));
        assert_eq!(log[1999], (1999, 1000));
        assert_eq!(log[2000], (2000, 2000));
        assert_eq!(log[2499], (2499, 2000));
    }

    #[tokio::test]
    async fn high_threshold_refills_incrementally() {
        let log = run_logged(2500, 1000, 999).await;
        assert_eq!(log.len(), 2500);
        // A replacement is issued as soon as one operation completes.
        assert_eq!(log[1000], (1000, 1));
        assert_eq!(log[1001], (1001, 2));
    }

    #[tokio::test]
    async fn intermediate_threshold_refills_in_partial_batches() {
        let log = run_logged(30, 10, 4).await;
        assert_eq!(log.len(), 30);
        // Refill waits until in-flight drops to the threshold, then tops up.
        assert_eq!(log[10], (10, 6));
    }

    #[tokio::test]
    async fn first_error_aborts_without_issuing_more() {
        let issued = RefCell::new(0usize);
        let result = drive_bounded(
            100,
            10,
            9,
            |index| {
                *issued.borrow_mut() += 1;
                async move {
                    if index == 3 {
                        Err(StoreError::DeleteFailed("boom".to_string()))
                    } else {
                        Ok(())
                    }
                }
            },
            |_, _| {},
        )
        .await;
        assert!(matches!(result, Err(StoreError::DeleteFailed(_))));
        assert!(*issued.borrow() <= 20);
    }

    #[tokio::test]
    async fn zero_cap_is_rejected() {
        let result = drive_bounded(1, 0, 0, |_| async { Ok(()) }, |_, _| {}).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn progress_fires_per_completion() {
        let mut ticks = Vec::new();
        drive_bounded(5, 2, 1, |_| async { Ok(()) }, |done, total| {
            ticks.push((done, total));
        })
        .await
        .expect("drive failed");
        assert_eq!(ticks, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    }
}
