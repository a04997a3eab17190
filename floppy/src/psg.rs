//! Drive and side selection through the sound chip's I/O port A
//!
//! Port A is shared with the printer strobe, the speaker and other lines, so
//! every update is a read-modify-write of the floppy bits only. The select and
//! data registers are a two step protocol, which [`PSG_LOCK`] keeps atomic with
//! respect to other users of the sound chip.

use spin::Mutex;

use crate::{
    geometry::{Drive, Side},
    hw::FloppyHardware,
    regs::{MixerControl, PortA, PsgRegister},
};

/// Held across every select-then-access sequence on the sound chip
pub static PSG_LOCK: Mutex<()> = Mutex::new(());

/// Port A with `drive` enabled, the other drive disabled and `side` selected.
/// Bits outside the floppy lines are kept from `current`.
pub fn port_a_value(current: PortA, drive: Drive, side: Side) -> PortA {
    let mut port = current | PortA::DRIVE_A_DISABLE | PortA::DRIVE_B_DISABLE;

    match drive {
        Drive::A => port.remove(PortA::DRIVE_A_DISABLE),
        Drive::B => port.remove(PortA::DRIVE_B_DISABLE),
    }

    // Inverted: a set bit selects side 0
    port.set(PortA::SIDE_0_SELECT, side == Side::Zero);
    port
}

fn update_port_a<H: FloppyHardware + ?Sized>(hw: &mut H, f: impl FnOnce(PortA) -> PortA) {
    let _guard = PSG_LOCK.lock();

    hw.select_psg_register(PsgRegister::PortA);
    let current = PortA::from_bits_retain(hw.read_psg());
    hw.write_psg(f(current).bits());
}

pub fn select_floppy_drive<H: FloppyHardware + ?Sized>(hw: &mut H, drive: Drive, side: Side) {
    log::debug!("selecting drive {drive:?} side {side:?}");
    update_port_a(hw, |current| port_a_value(current, drive, side));
}

/// Disables both drives, which lets their motors spin down
pub fn deselect_floppy_drives<H: FloppyHardware + ?Sized>(hw: &mut H) {
    update_port_a(hw, |current| {
        current | PortA::DRIVE_A_DISABLE | PortA::DRIVE_B_DISABLE
    });
}

/// Switches port A to output so the select lines are driven
pub fn enable_port_a_output<H: FloppyHardware + ?Sized>(hw: &mut H) {
    let _guard = PSG_LOCK.lock();

    hw.select_psg_register(PsgRegister::MixerControl);
    let mixer = MixerControl::from_bits_retain(hw.read_psg());
    hw.write_psg((mixer | MixerControl::PORT_A_OUTPUT).bits());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::SimulatedController;

    #[test]
    fn selection_touches_only_the_floppy_lines() {
        let current = PortA::SPEAKER_DISABLE | PortA::CENTRONICS_STROBE;

        let port = port_a_value(current, Drive::A, Side::Zero);
        assert_eq!(
            port,
            current | PortA::SIDE_0_SELECT | PortA::DRIVE_B_DISABLE
        );

        let port = port_a_value(port, Drive::B, Side::One);
        assert_eq!(port, current | PortA::DRIVE_A_DISABLE);
    }

    #[test]
    fn switching_drives_disables_the_previous_one() {
        let mut hw = SimulatedController::new();

        select_floppy_drive(&mut hw, Drive::A, Side::Zero);
        let port = hw.port_a();
        assert!(!port.contains(PortA::DRIVE_A_DISABLE));
        assert!(port.contains(PortA::DRIVE_B_DISABLE));
        assert!(port.contains(PortA::SIDE_0_SELECT));

        select_floppy_drive(&mut hw, Drive::B, Side::One);
        let port = hw.port_a();
        assert!(port.contains(PortA::DRIVE_A_DISABLE));
        assert!(!port.contains(PortA::DRIVE_B_DISABLE));
        assert!(!port.contains(PortA::SIDE_0_SELECT));

        deselect_floppy_drives(&mut hw);
        assert!(hw.port_a().contains(PortA::DRIVE_A_DISABLE | PortA::DRIVE_B_DISABLE));
    }

    #[test]
    fn port_a_output_is_enabled_in_the_mixer() {
        let mut hw = SimulatedController::new();

        enable_port_a_output(&mut hw);
        assert!(hw.mixer().contains(MixerControl::PORT_A_OUTPUT));
    }
}
