use runy_otp::prelude::*;
use runy_otp::Registry;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

// A counter that forgets everything when it restarts
pub struct Counter {
    name: &'static str,
    value: u64,
}

pub enum CounterCall {
    Get,
}

pub enum CounterCast {
    Incr,
    Crash,
}

impl Actor for Counter {
    type Args = &'static str;
    type Call = CounterCall;
    type Reply = u64;
    type Cast = CounterCast;
    type Continue = ();

    async fn init(init: Init<'_, Self>) -> InitResult<Self> {
        println!("Counter '{}' started as {}", init.args, init.ctx.id());
        Ok(Startup::ready(Counter {
            name: init.args,
            value: 0,
        }))
    }

    async fn handle_call(&mut self, _ctx: Call<'_, Self>, msg: CounterCall) -> anyhow::Result<u64> {
        match msg {
            CounterCall::Get => Ok(self.value),
        }
    }

    async fn handle_cast(&mut self, _ctx: Exec<'_, Self>, msg: CounterCast) -> anyhow::Result<()> {
        match msg {
            CounterCast::Incr => self.value += 1,
            CounterCast::Crash => anyhow::bail!("counter '{}' was told to crash", self.name),
        }
        Ok(())
    }

    async fn terminate(self, _ctx: &mut Context<Self>, reason: &ExitReason) {
        println!("Counter '{}' stopping at {} ({})", self.name, self.value, reason);
    }
}

async fn lookup(registry: &Registry, name: &str) -> Link<Counter> {
    // give the supervisor a moment to register a fresh incarnation
    for _ in 0..50 {
        if let Ok(link) = registry.lookup::<Counter>(name) {
            return link;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{name} never came back");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = Registry::new();

    // pool: one-for-one over two counters
    let pool = SupervisorSpec::new(Strategy::OneForOne)
        .child(ChildSpec::actor::<Counter>("left", "left").named("left"))
        .child(ChildSpec::actor::<Counter>("right", "right").named("right"));

    // root: the pool plus an audit counter, restarted together
    let root = SupervisorSpec::new(Strategy::RestForOne)
        .registry(registry.clone())
        .intensity(5, Duration::from_secs(10))
        .child(ChildSpec::supervisor("pool", pool))
        .child(ChildSpec::actor::<Counter>("audit", "audit").named("audit"));

    let root: SupervisorRef = Supervisor::start_link(root).await?;
    println!("Registered names: {:?}", registry.names());

    let left = lookup(&registry, "left").await;
    let right = lookup(&registry, "right").await;
    for _ in 0..3 {
        left.cast(CounterCast::Incr);
        right.cast(CounterCast::Incr);
    }
    println!("left = {}", left.call(CounterCall::Get, TIMEOUT).await?);
    println!("right = {}", right.call(CounterCall::Get, TIMEOUT).await?);

    println!("\n--- crashing 'left' (one-for-one inside the pool) ---");
    let old = left.id();
    left.cast(CounterCast::Crash);
    left.wait_exit().await;

    let left = loop {
        let link = lookup(&registry, "left").await;
        if link.id() != old {
            break link;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    println!("left = {} (restarted as {})", left.call(CounterCall::Get, TIMEOUT).await?, left.id());
    println!("right = {} (untouched)", right.call(CounterCall::Get, TIMEOUT).await?);

    println!("\n--- children of the root ---");
    for child in root.which_children().await? {
        println!("{:>6}: {:?} {:?}", child.id, child.kind, child.actor.map(|a| a.id()));
    }

    println!("\n--- shutting down ---");
    let reason = root.stop_and_wait(ExitReason::Shutdown).await;
    println!("root exited: {reason}");
    println!("Registered names after shutdown: {:?}", registry.names());

    Ok(())
}
