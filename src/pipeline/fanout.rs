//! Ordered fan-out / fan-in for one stage
//!
//! Every input gets its own task in a [`JoinSet`]. Results are collected as
//! they complete and written into a pre-sized slot vector by input index, so
//! completion order never leaks into the output. Dropping the stage future
//! aborts whatever is still in flight.

use std::future::Future;
use tokio::task::JoinSet;
use tracing::error;

use crate::error::PipelineError;

pub(crate) async fn fan_out<I, O, F, Fut>(
    stage: &'static str,
    inputs: Vec<I>,
    task: F,
) -> Result<Vec<O>, PipelineError>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let expected = inputs.len();
    let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(expected).collect();

    let mut tasks = JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        let work = task(input);
        tasks.spawn(async move { (index, work.await) });
    }

    // Drain everything before judging, so one broken task never cancels siblings
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, output)) => match slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(output),
                _ => failures.push(format!("slot {} filled twice", index)),
            },
            Err(e) => {
                error!(stage, "Sub-evaluation task failed: {}", e);
                failures.push(format!("task failed: {}", e));
            }
        }
    }

    if !failures.is_empty() {
        return Err(PipelineError::invariant(format!(
            "{} fan-in incomplete: {}",
            stage,
            failures.join("; ")
        )));
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                PipelineError::invariant(format!("{} fan-in missing result #{}", stage, index))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_follow_input_order() {
        // Earlier inputs sleep longer, so they complete last
        let inputs: Vec<u64> = (0..8).collect();
        let out = fan_out("test", inputs, |i| async move {
            tokio::time::sleep(Duration::from_millis((8 - i) * 10)).await;
            i * 100
        })
        .await
        .unwrap();
        assert_eq!(out, vec![0, 100, 200, 300, 400, 500, 600, 700]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let out: Vec<u32> = fan_out("test", Vec::<u32>::new(), |i| async move { i })
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_is_an_invariant_error() {
        let err = fan_out("test", vec![1u32, 2, 3], |i| async move {
            if i == 2 {
                panic!("boom");
            }
            i
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::InternalInvariant(_)));
        assert!(err.to_string().contains("task failed"));
    }

    #[tokio::test]
    async fn test_dropping_the_stage_aborts_pending_tasks() {
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = finished.clone();
        let stage = fan_out("test", vec![1u32, 2, 3], move |i| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                i
            }
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), stage).await.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
