use fail::FailScenario;

/// Fail points configured for the lifetime of the value and switched off on drop.
///
/// Holding the scenario serializes tests that use fail points, since [`FailScenario`] takes a
/// global lock.
pub struct OutboxFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> OutboxFailScenario<'a> {
    /// Configures every `(name, action)` pair, e.g. `("drain_cycle.before_delete", "panic")`.
    ///
    /// # Panics
    ///
    /// Panics if an action cannot be parsed.
    pub fn setup(failpoints: &[(&str, &str)]) -> OutboxFailScenario<'a> {
        let scenario = FailScenario::setup();

        for (name, action) in failpoints {
            fail::cfg(*name, action).expect("invalid fail point action");
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(name, _)| name.to_string())
                .collect(),
        }
    }
}

impl Drop for OutboxFailScenario<'_> {
    fn drop(&mut self) {
        for name in &self.failpoints {
            fail::remove(name);
        }
    }
}
