//! Example from the README.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use ordered_bus::{EventBus, EventRegistry};

struct Deposit(i64);
struct Withdrawal(i64);

#[derive(Default)]
struct Ledger {
    balance: AtomicI64,
}

impl Ledger {
    fn on_deposit(&self, deposit: &Deposit) {
        self.balance.fetch_add(deposit.0, Ordering::Relaxed);
    }

    fn on_withdrawal(&self, withdrawal: &Withdrawal) {
        self.balance.fetch_sub(withdrawal.0, Ordering::Relaxed);
    }
}

fn main() -> ordered_bus::Result<()> {
    let registry = EventRegistry::builder()
        .register::<Deposit>()
        .register::<Withdrawal>()
        .build();

    let bus = EventBus::new(registry)?;
    let processor = bus.get_processor();

    let ledger = Arc::new(Ledger::default());
    bus.subscribe(processor, &ledger, Ledger::on_deposit)?;
    bus.subscribe(processor, &ledger, Ledger::on_withdrawal)?;

    bus.submit(processor, Deposit(100))?;
    bus.submit(processor, Withdrawal(30))?;

    let moved = bus.move_to_processors();
    let dispatched = bus.process_events(processor)?;

    println!(
        "moved {moved} events, dispatched {dispatched}, balance is now {}",
        ledger.balance.load(Ordering::Relaxed)
    );

    Ok(())
}
