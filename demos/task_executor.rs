use runy_otp::{ExecutorConfig, TaskError, TaskExecutor};
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let exec = TaskExecutor::start(ExecutorConfig {
        max_tasks: Some(8),
        reap_after: Some(Duration::from_millis(500)),
    })
    .await?;

    // A slow computation: a short wait gives up, a longer one succeeds
    let answer = exec.submit(|| async {
        sleep(Duration::from_millis(50)).await;
        Ok(42)
    });
    match answer.wait(Duration::from_millis(10)).await {
        Err(TaskError::Timeout(after)) => println!("not ready after {after:?}"),
        other => println!("unexpected: {other:?}"),
    }
    println!("answer = {}", answer.wait(Duration::from_millis(100)).await?);

    // Failures stay inside the handle
    let broken = exec.submit(|| async { Err::<u32, _>(anyhow::anyhow!("input was empty")) });
    println!("broken task: {:?}", broken.wait(Duration::from_secs(1)).await);

    // Cancelling work that is still running
    let endless = exec.submit(|| async {
        sleep(Duration::from_secs(3600)).await;
        Ok("never")
    });
    endless.cancel()?;
    println!("cancelled task: {:?}", endless.wait(Duration::from_secs(1)).await);
    println!("cancel again: {:?}", endless.cancel());

    // Work past the reap deadline is stopped
    let slow = exec.submit(|| async {
        sleep(Duration::from_secs(5)).await;
        Ok(())
    });
    println!("reaped task: {:?}", slow.wait(Duration::from_secs(1)).await);

    // Fan out a batch and collect it
    let handles: Vec<_> = (1..=5u64)
        .map(|n| {
            exec.submit(move || async move {
                sleep(Duration::from_millis(10 * n)).await;
                Ok(n * n)
            })
        })
        .collect();
    let mut squares = Vec::new();
    for handle in &handles {
        squares.push(handle.wait(Duration::from_secs(1)).await?);
    }
    println!("squares = {squares:?}");

    let reason = exec.shutdown().await;
    println!("executor stopped: {reason}");
    Ok(())
}
