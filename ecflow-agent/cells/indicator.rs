use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::cells::{upgrade, Indicate};
use crate::ec::{Controller, LedCommand};
use crate::error::Result;

/// Power and charge LEDs driven by the controller firmware
#[derive(Debug)]
pub struct Indicator {
    name: &'static str,
    controller: Weak<Controller>,
    state: Mutex<LedCommand>,
}

impl Indicator {
    /// Probe by putting the LEDs in their initial state
    pub fn probe(
        name: &'static str,
        controller: &Arc<Controller>,
        initial: LedCommand,
    ) -> Result<Self> {
        controller.write_led(initial)?;
        tracing::debug!("{}: probed, LEDs {}", name, initial.name());

        Ok(Self {
            name,
            controller: Arc::downgrade(controller),
            state: Mutex::new(initial),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Indicate for Indicator {
    fn set(&self, led: LedCommand) -> Result<()> {
        let ec = upgrade(&self.controller, self.name)?;
        let mut state = self.state.lock();

        ec.write_led(led)?;
        *state = led;
        Ok(())
    }

    fn state(&self) -> LedCommand {
        *self.state.lock()
    }
}
