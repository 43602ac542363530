use anyhow::Result;
use log::{error, info};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};
use thiserror::Error;

/// Future type returned by [`SetupUnit::setup`].
pub type SetupFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A named, idempotent convergence step owned by one settings component.
///
/// `setup` reads the current settings and applies whatever change is needed
/// to reach its target; re-running a converged unit must be a no-op.
pub trait SetupUnit: Send + Sync {
    fn name(&self) -> &'static str;
    fn setup(&self) -> SetupFuture<'_>;
}

#[derive(Debug, Error)]
pub enum SetupError {
    /// A declared slot has no registered unit; fatal to the whole run.
    #[error("setup unit `{0}` is not registered")]
    UnitNotResolved(&'static str),

    /// A unit tried to register into a slot the runner never declared.
    #[error("no setup slot named `{0}`")]
    UnknownUnit(&'static str),

    /// A unit's own logic failed; later units were not invoked.
    #[error("setup unit `{unit}` failed")]
    UnitFailed {
        unit: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

struct Slot {
    name: &'static str,
    unit: Option<Arc<dyn SetupUnit>>,
}

/// Runs registered setup units strictly sequentially in a fixed declared
/// order, aborting on the first failure. Completed units are not rolled back.
pub struct SetupRunner {
    slots: Mutex<Vec<Slot>>,
}

impl SetupRunner {
    /// Declares the slot order. Units register into their named slot once
    /// their owning component is ready.
    pub fn new(order: &[&'static str]) -> Self {
        Self {
            slots: Mutex::new(
                order
                    .iter()
                    .map(|&name| Slot { name, unit: None })
                    .collect(),
            ),
        }
    }

    pub fn register(&self, unit: Arc<dyn SetupUnit>) -> Result<(), SetupError> {
        let mut slots = self.slots.lock().unwrap();
        let name = unit.name();
        let Some(slot) = slots.iter_mut().find(|slot| slot.name == name) else {
            return Err(SetupError::UnknownUnit(name));
        };

        slot.unit = Some(unit);
        Ok(())
    }

    /// Clears a slot on component teardown. The slot itself stays declared,
    /// so a later `run_all` treats it as a wiring error.
    pub fn deregister(&self, name: &str) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.iter_mut().find(|slot| slot.name == name) {
            slot.unit = None;
        }
    }

    /// Runs every unit in slot order, awaiting each before the next.
    ///
    /// All slots must be resolved before the first unit is invoked; an empty
    /// slot fails the run with zero units invoked.
    pub async fn run_all(&self) -> Result<(), SetupError> {
        let units: Vec<(&'static str, Arc<dyn SetupUnit>)> = {
            let slots = self.slots.lock().unwrap();
            let mut units = Vec::with_capacity(slots.len());
            for slot in slots.iter() {
                match &slot.unit {
                    Some(unit) => units.push((slot.name, Arc::clone(unit))),
                    None => {
                        error!(
                            "one-click setup aborted: unit `{}` is not registered",
                            slot.name
                        );
                        return Err(SetupError::UnitNotResolved(slot.name));
                    }
                }
            }
            units
        };

        for (name, unit) in units {
            info!("running setup step `{name}`");
            if let Err(source) = unit.setup().await {
                error!("one-click setup aborted at `{name}`: {source:#}");
                return Err(SetupError::UnitFailed { unit: name, source });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    struct TestUnit {
        name: &'static str,
        invocations: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl TestUnit {
        fn new(
            name: &'static str,
            invocations: &Arc<Mutex<Vec<&'static str>>>,
            fail: bool,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                invocations: Arc::clone(invocations),
                fail,
            })
        }
    }

    impl SetupUnit for TestUnit {
        fn name(&self) -> &'static str {
            self.name
        }

        fn setup(&self) -> SetupFuture<'_> {
            Box::pin(async move {
                self.invocations.lock().unwrap().push(self.name);
                if self.fail {
                    bail!("{} blew up", self.name);
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn runs_units_in_declared_order_not_registration_order() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let runner = SetupRunner::new(&["a", "b", "c"]);
        runner
            .register(TestUnit::new("c", &invocations, false))
            .expect("should register");
        runner
            .register(TestUnit::new("a", &invocations, false))
            .expect("should register");
        runner
            .register(TestUnit::new("b", &invocations, false))
            .expect("should register");

        runner.run_all().await.expect("run should succeed");

        assert_eq!(*invocations.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn aborts_after_first_failing_unit() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let runner = SetupRunner::new(&["a", "b", "c"]);
        runner
            .register(TestUnit::new("a", &invocations, false))
            .expect("should register");
        runner
            .register(TestUnit::new("b", &invocations, true))
            .expect("should register");
        runner
            .register(TestUnit::new("c", &invocations, false))
            .expect("should register");

        let err = runner.run_all().await.expect_err("run should fail");

        assert!(matches!(err, SetupError::UnitFailed { unit: "b", .. }));
        // a ran and keeps its effects, c never started
        assert_eq!(*invocations.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unresolved_slot_fails_before_any_unit_runs() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let runner = SetupRunner::new(&["a", "b", "c"]);
        runner
            .register(TestUnit::new("a", &invocations, false))
            .expect("should register");
        runner
            .register(TestUnit::new("c", &invocations, false))
            .expect("should register");

        let err = runner.run_all().await.expect_err("run should fail");

        assert!(matches!(err, SetupError::UnitNotResolved("b")));
        assert!(invocations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deregistered_unit_becomes_a_wiring_error() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let runner = SetupRunner::new(&["a"]);
        runner
            .register(TestUnit::new("a", &invocations, false))
            .expect("should register");

        runner.deregister("a");

        let err = runner.run_all().await.expect_err("run should fail");
        assert!(matches!(err, SetupError::UnitNotResolved("a")));
    }

    #[tokio::test]
    async fn rejects_registration_into_undeclared_slot() {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let runner = SetupRunner::new(&["a"]);

        let err = runner
            .register(TestUnit::new("z", &invocations, false))
            .expect_err("should reject");

        assert!(matches!(err, SetupError::UnknownUnit("z")));
    }
}
