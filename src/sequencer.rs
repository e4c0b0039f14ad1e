// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Ordered bring-up of the secure platform, in an early and a late phase.
//!
//! Only this module decides whether a failure is fatal. Fatal failures are returned as [`Fatal`],
//! tagged with the step that failed, and [`or_halt`] is the one place which halts on them.

use crate::{
    debug::DEBUG,
    error::Error,
    etzpc::{Etzpc, TZMA_ALL_SECURE, TZMA_ROM, TZMA_SYSRAM},
    handoff::{BootHandoff, BootTargetInfo, bl_params::ImageDescriptor},
    memory_map::{AddressRange, MemoryMap},
    platform::Platform,
    pmic::{self, PmicBus},
    tamper::{ExternalTamperConfig, TamperSlots},
};
use bitflags::bitflags;
use core::fmt::{self, Display, Formatter};
use log::{debug, error, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Interface the ROM code booted from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum BootInterface {
    /// SD card.
    FlashSd = 1,
    /// eMMC.
    FlashEmmc = 2,
    /// NOR flash over QSPI.
    FlashNorQspi = 3,
    /// NAND flash over FMC.
    FlashNandFmc = 4,
    /// Serial UART, for programming.
    SerialUart = 5,
    /// Serial USB, for programming.
    SerialUsb = 6,
    /// SPI NAND flash over QSPI.
    FlashSpiNandQspi = 7,
}

/// The boot interface and instance recorded by the ROM code.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BootContext {
    /// Raw [`BootInterface`] value.
    pub interface: u32,
    /// Instance of the interface, starting from 1.
    pub instance: u32,
}

bitflags! {
    /// When a console is used for output.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ConsoleScope: u32 {
        /// During boot.
        const BOOT = 1 << 0;
        /// At runtime, after the non-secure world has started.
        const RUNTIME = 1 << 1;
        /// For crash reports.
        const CRASH = 1 << 2;
    }
}

impl ConsoleScope {
    /// Returns the scope of the console started by the early phase.
    ///
    /// The console is only kept at runtime in debug builds.
    pub const fn early_console(debug: bool) -> Self {
        if debug {
            Self::BOOT.union(Self::CRASH).union(Self::RUNTIME)
        } else {
            Self::BOOT.union(Self::CRASH)
        }
    }
}

/// Drivers for the devices the sequencer brings up.
///
/// These are external collaborators; only their results matter here.
pub trait SecureDrivers {
    /// The bus the PMIC is attached to.
    type Pmic: PmicBus;

    /// Lets the non-secure world mask asynchronous (imprecise) aborts.
    fn allow_non_secure_abort_masking(&mut self);

    /// Maps the given regions and enables the MMU.
    fn enable_mmu(&mut self, map: &MemoryMap) -> Result<(), Error>;

    /// Opens and checks the device tree.
    fn open_device_tree(&mut self) -> Result<(), Error>;

    /// Probes the fuse (BSEC) controller.
    fn probe_fuses(&mut self) -> Result<(), Error>;

    /// Probes the clock tree.
    fn probe_clocks(&mut self) -> Result<(), Error>;

    /// Returns the base address of the stdout UART, if there is one and it is enabled.
    fn stdout_uart(&self) -> Option<usize>;

    /// Returns the interface the ROM code booted from.
    fn boot_context(&self) -> BootContext;

    /// Returns the base address of the given UART instance.
    fn uart_base(&self, instance: u32) -> Option<usize>;

    /// Registers a console on the UART at the given base address, used in the given scope.
    fn register_console(&mut self, base: usize, scope: ConsoleScope) -> Result<(), Error>;

    /// Returns the PMIC bus, if the device tree declares a PMIC.
    fn pmic(&mut self) -> Option<&mut Self::Pmic>;

    /// Fills in the low-power state descriptors.
    fn init_low_power_states(&mut self) -> Result<(), Error>;

    /// Returns the non-secure DRAM range.
    fn dram(&self) -> Result<AddressRange, Error>;

    /// Sets up the TZC400 memory firewall. DRAM must be initialised.
    fn init_memory_firewall(&mut self) -> Result<(), Error>;

    /// Starts the generic delay timer.
    fn init_generic_timer(&mut self) -> Result<(), Error>;

    /// Initialises the interrupt controller.
    fn init_interrupt_controller(&mut self) -> Result<(), Error>;

    /// Initialises the RTC driver.
    fn init_rtc(&mut self) -> Result<(), Error>;

    /// Initialises the RNG driver.
    fn init_rng(&mut self) -> Result<(), Error>;

    /// Initialises the TAMP driver, returning whether tamper detection is available.
    fn init_tamper(&mut self) -> Result<bool, Error>;

    /// Configures the internal and external tamper sources.
    fn configure_tampers(
        &mut self,
        internal: &TamperSlots,
        external: &TamperSlots,
        config: ExternalTamperConfig,
    ) -> Result<(), Error>;

    /// Makes the RTC record a timestamp on tamper events.
    fn enable_tamper_timestamp(&mut self);

    /// Initialises the timers used for clock calibration.
    fn init_timer(&mut self) -> Result<(), Error>;

    /// Starts clock calibration.
    fn init_calibration(&mut self);

    /// Initialises the independent watchdogs.
    fn init_watchdog(&mut self) -> Result<(), Error>;

    /// Starts the SCMI server.
    fn init_scmi_server(&mut self) -> Result<(), Error>;
}

/// A fatal step of the bring-up sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Checking the parameters passed by BL2.
    Handoff,
    /// Mapping memory and enabling the MMU.
    Mmu,
    /// Opening the device tree.
    DeviceTree,
    /// Probing the fuses.
    Fuses,
    /// Probing the clock tree.
    Clocks,
    /// Registering the console.
    Console,
    /// Setting up the ETZPC.
    Etzpc,
    /// Bringing up the PMIC.
    Pmic,
    /// Filling in low-power states.
    LowPowerStates,
    /// Setting up the memory firewall.
    MemoryFirewall,
    /// Starting the generic timer.
    GenericTimer,
    /// Initialising the interrupt controller.
    InterruptController,
    /// Initialising the watchdog.
    Watchdog,
    /// Starting the SCMI server.
    ScmiServer,
    /// Resolving the non-secure entry point.
    EntryPoint,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Handoff => "BL2 parameter check",
            Self::Mmu => "MMU setup",
            Self::DeviceTree => "device tree check",
            Self::Fuses => "BSEC probe",
            Self::Clocks => "clock probe",
            Self::Console => "console setup",
            Self::Etzpc => "ETZPC setup",
            Self::Pmic => "PMIC setup",
            Self::LowPowerStates => "low-power state setup",
            Self::MemoryFirewall => "TZC400 setup",
            Self::GenericTimer => "generic timer setup",
            Self::InterruptController => "GIC setup",
            Self::Watchdog => "IWDG setup",
            Self::ScmiServer => "SCMI server setup",
            Self::EntryPoint => "BL33 entry point resolution",
        })
    }
}

/// A failure which must halt the system.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("{step} failed: {error}")]
pub struct Fatal {
    /// The step which failed.
    pub step: Step,
    /// Why it failed.
    pub error: Error,
}

impl Fatal {
    /// Returns a function tagging an error with the given step.
    pub fn at(step: Step) -> impl Fn(Error) -> Self {
        move |error| Self { step, error }
    }
}

/// Logs the fatal error and halts the platform.
pub fn halt<P: Platform>(fatal: &Fatal) -> ! {
    error!("{fatal}");
    P::halt()
}

/// Returns the value of a successful step, or halts.
pub fn or_halt<P: Platform, T>(result: Result<T, Fatal>) -> T {
    match result {
        Ok(value) => value,
        Err(fatal) => halt::<P>(&fatal),
    }
}

/// Returns whether the boot interface is still using the UART at `stdout_base`.
fn uart_owned_by_boot_interface(
    stdout_base: usize,
    boot: BootContext,
    boot_uart_base: impl FnOnce(u32) -> Option<usize>,
) -> bool {
    BootInterface::try_from(boot.interface) == Ok(BootInterface::SerialUart)
        && boot_uart_base(boot.instance) == Some(stdout_base)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Created,
    Early,
    Late,
}

/// Runs the bring-up sequence and owns the state it produces.
pub struct Sequencer<P: Platform> {
    drivers: P::Drivers,
    etzpc_registers: Option<P::EtzpcRegisters>,
    etzpc: Option<Etzpc<P::EtzpcRegisters>>,
    handoff: BootHandoff,
    backup: P::BackupDomain,
    context_store: P::ContextStore,
    phase: Phase,
}

impl<P: Platform> Sequencer<P> {
    /// Creates a sequencer which hasn't run any steps yet.
    pub fn new(
        drivers: P::Drivers,
        etzpc_registers: P::EtzpcRegisters,
        backup: P::BackupDomain,
        context_store: P::ContextStore,
    ) -> Self {
        Self {
            drivers,
            etzpc_registers: Some(etzpc_registers),
            etzpc: None,
            handoff: BootHandoff::default(),
            backup,
            context_store,
            phase: Phase::Created,
        }
    }

    /// Returns the drivers.
    pub fn drivers(&self) -> &P::Drivers {
        &self.drivers
    }

    /// Returns the ETZPC driver, once the early phase has probed it.
    pub fn etzpc(&mut self) -> Option<&mut Etzpc<P::EtzpcRegisters>> {
        self.etzpc.as_mut()
    }

    /// Returns the BL33 handoff state.
    pub fn handoff(&self) -> &BootHandoff {
        &self.handoff
    }

    /// Runs the early phase, with the images passed by BL2.
    pub fn early_setup(
        &mut self,
        images: impl IntoIterator<Item = ImageDescriptor>,
    ) -> Result<(), Fatal> {
        assert_eq!(self.phase, Phase::Created, "Early setup already run");

        self.drivers.allow_non_secure_abort_masking();
        self.enable_mmu().map_err(Fatal::at(Step::Mmu))?;
        self.handoff = BootHandoff::from_images(images);
        self.drivers
            .open_device_tree()
            .map_err(Fatal::at(Step::DeviceTree))?;
        self.drivers
            .probe_fuses()
            .map_err(Fatal::at(Step::Fuses))?;
        self.drivers
            .probe_clocks()
            .map_err(Fatal::at(Step::Clocks))?;
        self.start_console().map_err(Fatal::at(Step::Console))?;
        self.setup_etzpc().map_err(Fatal::at(Step::Etzpc))?;
        if let Some(pmic) = self.drivers.pmic() {
            let mode = pmic::setup(pmic).map_err(Fatal::at(Step::Pmic))?;
            info!("PMIC ready on {mode:?}");
        }
        self.drivers
            .init_low_power_states()
            .map_err(Fatal::at(Step::LowPowerStates))?;

        self.phase = Phase::Early;
        Ok(())
    }

    /// Runs the late phase. DRAM must be initialised.
    pub fn late_setup(&mut self) -> Result<(), Fatal> {
        assert_eq!(self.phase, Phase::Early, "Early setup must run first");

        self.drivers
            .init_memory_firewall()
            .map_err(Fatal::at(Step::MemoryFirewall))?;
        self.drivers
            .init_generic_timer()
            .map_err(Fatal::at(Step::GenericTimer))?;
        self.drivers
            .init_interrupt_controller()
            .map_err(Fatal::at(Step::InterruptController))?;
        self.init_secure_peripherals();
        self.drivers
            .init_watchdog()
            .map_err(Fatal::at(Step::Watchdog))?;
        if let Some(etzpc) = &mut self.etzpc {
            etzpc.freeze();
        }
        self.drivers
            .init_scmi_server()
            .map_err(Fatal::at(Step::ScmiServer))?;

        self.phase = Phase::Late;
        Ok(())
    }

    /// Returns the non-secure entry point, resolving it on the first call.
    pub fn next_entry_point(&mut self) -> Result<BootTargetInfo, Fatal> {
        assert_ne!(self.phase, Phase::Created, "Early setup must run first");

        if self.handoff.target().is_resolved() {
            return Ok(*self.handoff.target());
        }
        let dram = self.drivers.dram().map_err(Fatal::at(Step::EntryPoint))?;
        self.handoff
            .next_entry_point(&mut self.backup, &mut self.context_store, &dram)
            .copied()
            .map_err(Fatal::at(Step::EntryPoint))
    }

    fn enable_mmu(&mut self) -> Result<(), Error> {
        let mut map = MemoryMap::new();
        map.add(P::code_region())?;
        for region in P::memory_regions() {
            map.add(*region)?;
        }
        self.drivers.enable_mmu(&map)
    }

    fn start_console(&mut self) -> Result<(), Error> {
        let Some(base) = self.drivers.stdout_uart() else {
            return Ok(());
        };
        if uart_owned_by_boot_interface(base, self.drivers.boot_context(), |instance| {
            self.drivers.uart_base(instance)
        }) {
            debug!("UART at {base:#x} used by boot interface, no console");
            return Ok(());
        }
        self.drivers
            .register_console(base, ConsoleScope::early_console(DEBUG))
    }

    fn setup_etzpc(&mut self) -> Result<(), Error> {
        let registers = self
            .etzpc_registers
            .take()
            .ok_or(Error::ResourceUnavailable)?;
        let mut etzpc = Etzpc::probe(registers)?;
        for (zone, range) in [
            (TZMA_ROM, TZMA_ALL_SECURE),
            (TZMA_SYSRAM, P::TZMA_SYSRAM_RANGE),
        ] {
            etzpc.configure_tzma(zone, range)?;
            etzpc.lock_tzma(zone)?;
        }
        self.etzpc = Some(etzpc);
        Ok(())
    }

    fn init_secure_peripherals(&mut self) {
        if let Err(e) = self.drivers.init_rtc() {
            warn!("RTC driver init error {e}");
        }
        if let Err(e) = self.drivers.init_rng() {
            warn!("RNG driver init error {e}");
        }
        match self.drivers.init_tamper() {
            Ok(true) => {
                if let Err(e) = self.configure_tampers() {
                    warn!("Tamper configuration error {e}");
                }
                self.drivers.enable_tamper_timestamp();
            }
            Ok(false) => debug!("No tamper detection"),
            Err(e) => warn!("TAMP driver init error {e}"),
        }
        match self.drivers.init_timer() {
            Ok(()) => self.drivers.init_calibration(),
            Err(e) => warn!("Timer init error {e}, no clock calibration"),
        }
    }

    fn configure_tampers(&mut self) -> Result<(), Error> {
        let mut internal = TamperSlots::unused(P::INTERNAL_TAMPER_COUNT)?;
        let mut external = TamperSlots::unused(P::EXTERNAL_TAMPER_COUNT)?;
        P::fill_tamper_slots(&mut internal, &mut external)?;
        self.drivers
            .configure_tampers(&internal, &external, ExternalTamperConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{Corruption, DomainKind},
        etzpc::DecprotAttribute,
        handoff::{RESUME_MAGIC, bl_params::ImageId, context::Spsr},
        platform::test::{
            FakeBackupDomain, FakeContextStore, FakeDrivers, FakeEtzpc, FakePmicBus,
            TestPlatform,
        },
    };
    use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

    const EARLY_STEPS: [&str; 8] = [
        "allow_non_secure_abort_masking",
        "enable_mmu",
        "open_device_tree",
        "probe_fuses",
        "probe_clocks",
        "register_console",
        "pmic",
        "init_low_power_states",
    ];

    const LATE_STEPS: [&str; 12] = [
        "init_memory_firewall",
        "init_generic_timer",
        "init_interrupt_controller",
        "init_rtc",
        "init_rng",
        "init_tamper",
        "configure_tampers",
        "enable_tamper_timestamp",
        "init_timer",
        "init_calibration",
        "init_watchdog",
        "init_scmi_server",
    ];

    fn sequencer(drivers: FakeDrivers) -> Sequencer<TestPlatform> {
        Sequencer::new(
            drivers,
            FakeEtzpc::new(96, 2),
            FakeBackupDomain::new(RESUME_MAGIC, 0xc000_1000),
            FakeContextStore::default(),
        )
    }

    fn bl33() -> ImageDescriptor {
        ImageDescriptor {
            image_id: ImageId::Bl33.into(),
            pc: 0xc010_0000,
            spsr: Spsr::from_bits_retain(0x1da),
            ..Default::default()
        }
    }

    fn early_steps() -> Vec<&'static str> {
        EARLY_STEPS.to_vec()
    }

    #[test]
    fn early_phase_order() {
        let mut sequencer = sequencer(FakeDrivers::default());
        sequencer.early_setup([bl33()]).unwrap();
        assert_eq!(sequencer.drivers().calls, early_steps());
        assert_eq!(sequencer.drivers().mapped_regions, 2);
        assert_eq!(sequencer.handoff().target().pc(), 0xc010_0000);
        assert!(sequencer.drivers().pmic_bus.as_ref().unwrap().calls.len() > 1);

        let etzpc = sequencer.etzpc().unwrap();
        assert_eq!(etzpc.tzma(TZMA_ROM), Ok(TZMA_ALL_SECURE));
        assert_eq!(
            etzpc.tzma(TZMA_SYSRAM),
            Ok(TestPlatform::TZMA_SYSRAM_RANGE)
        );
        assert_eq!(etzpc.tzma_locked(TZMA_ROM), Ok(true));
        assert_eq!(etzpc.tzma_locked(TZMA_SYSRAM), Ok(true));
        assert!(!etzpc.is_frozen());
    }

    #[test]
    fn early_phase_without_pmic() {
        let mut sequencer = sequencer(FakeDrivers {
            pmic_bus: None,
            ..Default::default()
        });
        sequencer.early_setup([bl33()]).unwrap();
        let mut expected = early_steps();
        expected.retain(|step| *step != "pmic");
        assert_eq!(sequencer.drivers().calls, expected);
    }

    #[test]
    fn early_phase_fails_fast() {
        for (failing, step) in [
            ("enable_mmu", Step::Mmu),
            ("open_device_tree", Step::DeviceTree),
            ("probe_fuses", Step::Fuses),
            ("probe_clocks", Step::Clocks),
            ("register_console", Step::Console),
            ("init_low_power_states", Step::LowPowerStates),
        ] {
            let mut sequencer = sequencer(FakeDrivers::failing(failing));
            assert_eq!(
                sequencer.early_setup([bl33()]),
                Err(Fatal {
                    step,
                    error: Error::ResourceUnavailable
                })
            );
            let calls = &sequencer.drivers().calls;
            assert_eq!(calls.last(), Some(&failing));
            let expected = early_steps();
            let position = expected.iter().position(|s| *s == failing).unwrap();
            assert_eq!(calls.as_slice(), &expected[..=position]);
        }
    }

    #[test]
    fn missing_etzpc_is_fatal() {
        let mut sequencer = Sequencer::<TestPlatform>::new(
            FakeDrivers::default(),
            FakeEtzpc::new(0, 0),
            FakeBackupDomain::new(0, 0),
            FakeContextStore::default(),
        );
        assert_eq!(
            sequencer.early_setup([]),
            Err(Fatal {
                step: Step::Etzpc,
                error: Error::ResourceUnavailable
            })
        );
        assert!(!sequencer.drivers().calls.contains(&"pmic"));
    }

    #[test]
    fn etzpc_locked_to_other_range_is_fatal() {
        let mut etzpc = FakeEtzpc::new(96, 2);
        etzpc.preset_tzma(TZMA_SYSRAM as usize, 0x10, true);
        let mut sequencer = Sequencer::<TestPlatform>::new(
            FakeDrivers::default(),
            etzpc,
            FakeBackupDomain::new(0, 0),
            FakeContextStore::default(),
        );
        assert_eq!(
            sequencer.early_setup([]),
            Err(Fatal {
                step: Step::Etzpc,
                error: Error::Locked {
                    kind: DomainKind::MemoryZone,
                    id: TZMA_SYSRAM
                }
            })
        );
    }

    #[test]
    fn pmic_failure_is_fatal() {
        let mut sequencer = sequencer(FakeDrivers {
            pmic_bus: Some(FakePmicBus {
                id_error: Some(Error::ResourceUnavailable),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(
            sequencer.early_setup([]),
            Err(Fatal {
                step: Step::Pmic,
                error: Error::ResourceUnavailable
            })
        );
    }

    #[test]
    fn console_skipped_when_boot_uart_in_use() {
        let mut drivers = FakeDrivers::default();
        drivers.boot = BootContext {
            interface: BootInterface::SerialUart.into(),
            instance: 4,
        };
        let mut sequencer = sequencer(drivers);
        sequencer.early_setup([]).unwrap();
        assert!(!sequencer.drivers().calls.contains(&"register_console"));
    }

    #[test]
    fn console_runtime_only_in_debug_builds() {
        let mut sequencer = sequencer(FakeDrivers::default());
        sequencer.early_setup([]).unwrap();
        let scope = sequencer.drivers().console_scope.unwrap();
        assert!(scope.contains(ConsoleScope::BOOT | ConsoleScope::CRASH));
        assert_eq!(scope.contains(ConsoleScope::RUNTIME), DEBUG);

        assert!(ConsoleScope::early_console(true).contains(ConsoleScope::RUNTIME));
        assert_eq!(
            ConsoleScope::early_console(false),
            ConsoleScope::BOOT | ConsoleScope::CRASH
        );
    }

    #[test]
    fn console_skip_logic() {
        let uart = |instance| match instance {
            4 => Some(0x4001_0000),
            7 => Some(0x4001_8000),
            _ => None,
        };
        let serial = |instance| BootContext {
            interface: BootInterface::SerialUart.into(),
            instance,
        };
        assert!(uart_owned_by_boot_interface(0x4001_0000, serial(4), uart));
        assert!(!uart_owned_by_boot_interface(0x4001_0000, serial(7), uart));
        assert!(!uart_owned_by_boot_interface(0x4001_0000, serial(2), uart));
        let usb = BootContext {
            interface: BootInterface::SerialUsb.into(),
            instance: 4,
        };
        assert!(!uart_owned_by_boot_interface(0x4001_0000, usb, uart));
        let unknown = BootContext {
            interface: 0x42,
            instance: 4,
        };
        assert!(!uart_owned_by_boot_interface(0x4001_0000, unknown, uart));
    }

    #[test]
    fn console_skipped_without_stdout() {
        let mut sequencer = sequencer(FakeDrivers {
            stdout_uart: None,
            ..Default::default()
        });
        sequencer.early_setup([]).unwrap();
        assert!(!sequencer.drivers().calls.contains(&"register_console"));
    }

    #[test]
    fn late_phase_order() {
        let mut sequencer = sequencer(FakeDrivers::default());
        sequencer.early_setup([bl33()]).unwrap();
        let early = sequencer.drivers().calls.len();
        sequencer.late_setup().unwrap();
        assert_eq!(&sequencer.drivers().calls[early..], LATE_STEPS.as_slice());
        assert_eq!(sequencer.drivers().enabled_internal_tampers, 1);

        let etzpc = sequencer.etzpc().unwrap();
        assert!(etzpc.is_frozen());
        assert!(
            etzpc
                .configure_decprot(3, DecprotAttribute::NonSecureReadWrite)
                .is_err()
        );
    }

    #[test]
    fn late_phase_warnings_are_not_fatal() {
        let mut drivers = FakeDrivers::failing_all(&[
            "init_rtc",
            "init_rng",
            "init_tamper",
            "init_timer",
        ]);
        drivers.tamper_present = true;
        let mut sequencer = sequencer(drivers);
        sequencer.early_setup([]).unwrap();
        let early = sequencer.drivers().calls.len();
        sequencer.late_setup().unwrap();
        assert_eq!(
            &sequencer.drivers().calls[early..],
            &[
                "init_memory_firewall",
                "init_generic_timer",
                "init_interrupt_controller",
                "init_rtc",
                "init_rng",
                "init_tamper",
                "init_timer",
                "init_watchdog",
                "init_scmi_server",
            ]
        );
        assert!(sequencer.etzpc().unwrap().is_frozen());
    }

    #[test]
    fn no_tamper_hardware() {
        let mut sequencer = sequencer(FakeDrivers {
            tamper_present: false,
            ..Default::default()
        });
        sequencer.early_setup([]).unwrap();
        sequencer.late_setup().unwrap();
        assert!(!sequencer.drivers().calls.contains(&"configure_tampers"));
        assert!(
            !sequencer
                .drivers()
                .calls
                .contains(&"enable_tamper_timestamp")
        );
    }

    #[test]
    fn late_phase_fails_fast() {
        for (failing, step) in [
            ("init_memory_firewall", Step::MemoryFirewall),
            ("init_generic_timer", Step::GenericTimer),
            ("init_interrupt_controller", Step::InterruptController),
            ("init_watchdog", Step::Watchdog),
            ("init_scmi_server", Step::ScmiServer),
        ] {
            let mut sequencer = sequencer(FakeDrivers::failing(failing));
            sequencer.early_setup([]).unwrap();
            assert_eq!(
                sequencer.late_setup(),
                Err(Fatal {
                    step,
                    error: Error::ResourceUnavailable
                })
            );
            assert_eq!(sequencer.drivers().calls.last(), Some(&failing));
            // The ETZPC is only frozen once the watchdog is running.
            let frozen = step == Step::ScmiServer;
            assert_eq!(sequencer.etzpc().unwrap().is_frozen(), frozen);
        }
    }

    #[test]
    #[should_panic(expected = "Early setup must run first")]
    fn late_before_early() {
        let mut sequencer = sequencer(FakeDrivers::default());
        let _ = sequencer.late_setup();
    }

    #[test]
    fn cold_boot_entry_point() {
        let mut sequencer = sequencer(FakeDrivers::default());
        sequencer.early_setup([bl33()]).unwrap();
        sequencer.late_setup().unwrap();
        let target = sequencer.next_entry_point().unwrap();
        assert_eq!(target.pc(), 0xc010_0000);
        assert_eq!(sequencer.next_entry_point(), Ok(target));
    }

    #[test]
    fn resume_entry_point_outside_dram_halts() {
        let mut sequencer = Sequencer::<TestPlatform>::new(
            FakeDrivers::default(),
            FakeEtzpc::new(96, 2),
            FakeBackupDomain::new(RESUME_MAGIC, 0x1000),
            FakeContextStore::with_context(Default::default()),
        );
        sequencer.early_setup([]).unwrap();
        sequencer.late_setup().unwrap();
        let result = sequencer.next_entry_point();
        assert_eq!(
            result,
            Err(Fatal {
                step: Step::EntryPoint,
                error: Error::CorruptedState(Corruption::ResumeAddressOutOfRange { pc: 0x1000 })
            })
        );

        let halted = catch_unwind(AssertUnwindSafe(|| or_halt::<TestPlatform, _>(result)));
        match halted {
            Err(err) => {
                if err.downcast_ref::<String>().map(String::as_str)
                    != Some(TestPlatform::HALT_MAGIC)
                {
                    resume_unwind(err);
                }
            }
            Ok(_) => panic!("Expected platform to halt"),
        }
    }

    #[test]
    fn or_halt_passes_success_through() {
        assert_eq!(or_halt::<TestPlatform, _>(Ok(42)), 42);
    }

    #[test]
    fn fatal_display_names_step() {
        let fatal = Fatal {
            step: Step::Fuses,
            error: Error::ResourceUnavailable,
        };
        assert_eq!(fatal.to_string(), "BSEC probe failed: resource unavailable");
    }
}
