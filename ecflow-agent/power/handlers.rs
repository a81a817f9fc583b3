use std::sync::Arc;

use crate::ec::{Controller, PowerCommand};
use crate::error::RegistrationError;
use crate::power::chain::{ChainKind, PowerChains, PowerEvent, Priority, RegistrationHandle, RestartMode};

/// Power-off and restart registrations owned by one controller
///
/// Revoked on drop, so the handlers never outlive the controller they
/// captured.
pub struct EcPowerHandlers {
    chains: Arc<PowerChains>,
    handles: Vec<RegistrationHandle>,
}

impl EcPowerHandlers {
    pub fn handles(&self) -> &[RegistrationHandle] {
        &self.handles
    }

    /// Remove every registration now
    pub fn revoke(mut self) {
        self.revoke_all();
    }

    fn revoke_all(&mut self) {
        for handle in self.handles.drain(..).rev() {
            if let Err(e) = self.chains.revoke(handle) {
                tracing::warn!("Failed to revoke {} handler: {}", handle.kind(), e);
            }
        }
    }
}

impl Drop for EcPowerHandlers {
    fn drop(&mut self) {
        self.revoke_all();
    }
}

/// Send `command` once, then hold the caller until it has latched
///
/// A failed write is logged and not retried: the window to act is bounded
/// and lower-priority handlers still get their turn.
fn fire(controller: &Controller, command: PowerCommand) {
    if let Err(e) = controller.issue(command) {
        tracing::error!(
            "{}: {} command failed: {}",
            controller.name(),
            command.name(),
            e
        );
    }
    controller.settle_after_command();
}

/// Register the controller as the high-priority power-off and restart handler
///
/// Either both handlers are registered or neither is.
pub fn register_ec_handlers(
    chains: &Arc<PowerChains>,
    controller: &Arc<Controller>,
) -> Result<EcPowerHandlers, RegistrationError> {
    let mut handlers = EcPowerHandlers {
        chains: Arc::clone(chains),
        handles: Vec::with_capacity(2),
    };

    let ec = Arc::clone(controller);
    let name = format!("{}-power-off", controller.name());
    handlers.handles.push(chains.register(
        ChainKind::PowerOff,
        Priority::HIGH,
        name,
        move |_event| fire(&ec, PowerCommand::Shutdown),
    )?);

    let ec = Arc::clone(controller);
    let name = format!("{}-restart", controller.name());
    handlers.handles.push(chains.register(
        ChainKind::Restart,
        Priority::HIGH,
        name,
        move |event| {
            let command = match event.mode() {
                Some(RestartMode::Warm) => PowerCommand::WarmReboot,
                _ => PowerCommand::ColdReboot,
            };
            fire(&ec, command)
        },
    )?);

    tracing::info!("{}: registered as system power controller", controller.name());
    Ok(handlers)
}

/// Power off by restarting, letting the bootloader hold the machine
///
/// Runs at default priority, below any controller that can cut power itself.
pub fn register_restart_poweroff(
    chains: &Arc<PowerChains>,
) -> Result<RegistrationHandle, RegistrationError> {
    let weak = Arc::downgrade(chains);
    chains.register(
        ChainKind::PowerOff,
        Priority::DEFAULT,
        "restart-poweroff",
        move |_event| {
            if let Some(chains) = weak.upgrade() {
                chains.dispatch_restart(RestartMode::Hard);
            }
        },
    )
}

/// Ask the kernel to power off or reboot once every other handler returned
pub fn register_kernel_fallback(
    chains: &Arc<PowerChains>,
) -> Result<Vec<RegistrationHandle>, RegistrationError> {
    use nix::sys::reboot::{reboot, RebootMode};

    fn kernel(event: &PowerEvent) {
        let mode = match event {
            PowerEvent::PowerOff => RebootMode::RB_POWER_OFF,
            PowerEvent::Restart(_) => RebootMode::RB_AUTOBOOT,
        };
        nix::unistd::sync();
        if let Err(e) = reboot(mode) {
            tracing::error!("Kernel {} failed: {}", event, e);
        }
    }

    let power_off = chains.register(ChainKind::PowerOff, Priority::LOW, "kernel-power-off", kernel)?;
    match chains.register(ChainKind::Restart, Priority::LOW, "kernel-restart", kernel) {
        Ok(restart) => Ok(vec![power_off, restart]),
        Err(e) => {
            if let Err(revoke) = chains.revoke(power_off) {
                tracing::warn!("Failed to revoke {} handler: {}", power_off.kind(), revoke);
            }
            Err(e)
        }
    }
}
