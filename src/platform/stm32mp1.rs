// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! STM32MP1 running SP_MIN as BL32.
//!
//! The SoC drivers (clocks, fuses, TZC400, RTC, TAMP and the rest) stay in C, and are reached
//! through the `extern "C"` functions below.

use super::Platform;
use crate::{
    error::Error,
    etzpc::{registers::MmioEtzpc, tzma_secure_range},
    handoff::{
        BackupDomain, BackupRegister,
        bl_params::{self, BlParams, EntryPointInfo},
        context::{ContextStore, NonSecureContext},
    },
    interrupts::{
        Dispatcher, MAX_SPI_ID, SECURE_INTERRUPT_ROUTES, SecureInterruptHandlers, gicv2::GicV2,
    },
    logger::{self, LockedWriter},
    memory_map::{AddressRange, MemoryAttributes, MemoryMap, MemoryRegion},
    mmio::MmioDerefWrapper,
    pmic::{BusMode, PmicBus},
    sequencer::{BootContext, ConsoleScope, Fatal, SecureDrivers, Sequencer, Step, or_halt},
    tamper::{ExternalTamperConfig, MAX_TAMPER_SLOTS, TamperMode, TamperSlot, TamperSlots},
};
use arm_gic::IntId;
use arrayvec::ArrayVec;
use core::{arch::asm, fmt, ptr};
use log::{error, info, warn};
use spin::{Once, mutex::SpinMutex};
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

const SYSRAM_BASE: usize = 0x2ffc_0000;
const SYSRAM_SIZE: usize = 0x0004_0000;
const NS_SYSRAM_SIZE: usize = 0x1000;
const NS_SYSRAM_BASE: usize = SYSRAM_BASE + SYSRAM_SIZE - NS_SYSRAM_SIZE;
const DEVICE1_BASE: usize = 0x5000_0000;
const DEVICE1_SIZE: usize = 0x4000_0000;
const DEVICE2_BASE: usize = 0xa000_0000;
const DEVICE2_SIZE: usize = 0x2000_0000;
const DDR_BASE: usize = 0xc000_0000;

const RCC_BASE: usize = 0x5000_0000;
const BKPSRAM_BASE: usize = 0x5400_0000;
const ETZPC_BASE: usize = 0x5c00_7000;
const TAMP_BASE: usize = 0x5c00_a000;
const GICD_BASE: usize = 0xa002_1000;
const GICC_BASE: usize = 0xa002_2000;

const UART_BAUDRATE: u32 = 115_200;

/// `CONSOLE_FLAG_TRANSLATE_CRLF`.
const CONSOLE_FLAG_TRANSLATE_CRLF: u32 = 1 << 8;

/// SCR.AW, allowing the non-secure world to mask asynchronous aborts.
const SCR_AW: u32 = 1 << 5;

/// `status` of a device tree node which is disabled.
const DT_DISABLED: u32 = 0;

// Memory type attributes of `mmap_add_region`.
const MT_DEVICE: u32 = 0;
const MT_MEMORY: u32 = 2;
const MT_RW: u32 = 1 << 3;
const MT_NS: u32 = 1 << 4;
const MT_EXECUTE_NEVER: u32 = 1 << 5;

static MEMORY_REGIONS: [MemoryRegion; 4] = [
    MemoryRegion::new(
        SYSRAM_BASE,
        NS_SYSRAM_BASE - SYSRAM_BASE,
        MemoryAttributes::RW_DATA,
    ),
    MemoryRegion::new(
        NS_SYSRAM_BASE,
        NS_SYSRAM_SIZE,
        MemoryAttributes::RW_DATA.union(MemoryAttributes::NON_SECURE),
    ),
    MemoryRegion::new(DEVICE1_BASE, DEVICE1_SIZE, MemoryAttributes::DEVICE_RW),
    MemoryRegion::new(DEVICE2_BASE, DEVICE2_SIZE, MemoryAttributes::DEVICE_RW),
];

unsafe extern "C" {
    // These aren't really variables, just symbols defined by the linker script whose addresses we
    // need to get. They should never be read or written.
    static __TEXT_START__: u32;
    static __RODATA_END__: u32;
}

#[repr(C)]
struct DtNodeInfo {
    base: u32,
    clock: i32,
    reset: i32,
    status: u32,
}

/// `struct stm32_tamp_int` and `struct stm32_tamp_ext`.
#[derive(Clone, Copy)]
#[repr(C)]
struct Stm32Tamp {
    id: i32,
    func: Option<extern "C" fn(id: i32) -> u32>,
}

unsafe extern "C" {
    safe fn mmap_add_region(base_pa: u64, base_va: usize, size: usize, attr: u32);
    safe fn configure_mmu();
    safe fn dt_open_and_check() -> i32;
    safe fn bsec_probe() -> u32;
    safe fn stm32mp1_clk_probe() -> i32;
    fn dt_get_stdout_uart_info(info: *mut DtNodeInfo) -> i32;
    fn stm32_get_boot_interface(interface: *mut u32, instance: *mut u32);
    safe fn get_uart_address(instance: u32) -> usize;
    /// Registers the UART at `base` as a console with the given `CONSOLE_FLAG_*` flags.
    safe fn stm32mp1_console_register(base: usize, baudrate: u32, flags: u32) -> i32;
    safe fn console_putc(c: i32) -> i32;
    safe fn console_flush();
    safe fn dt_pmic_status() -> i32;
    safe fn initialize_pmic_i2c() -> bool;
    fn stpmic1_get_version(version: *mut u32) -> i32;
    safe fn pmic_configure_boot_on_regulators() -> i32;
    safe fn stm32mp1_init_lp_states();
    safe fn dt_get_ddr_size() -> u32;
    safe fn stm32mp1_security_setup();
    safe fn generic_delay_timer_init();
    safe fn stm32mp1_gic_init();
    safe fn stm32_rtc_init() -> i32;
    safe fn stm32_rng_init() -> i32;
    safe fn stm32_tamp_init() -> i32;
    fn stm32_tamp_configure_internal(tamps: *const Stm32Tamp, count: u32);
    fn stm32_tamp_configure_external(
        tamps: *const Stm32Tamp,
        count: u32,
        filter_conf: u32,
        active_conf: u32,
    );
    safe fn stm32_rtc_set_tamper_timestamp();
    safe fn stm32_timer_init() -> i32;
    safe fn stm32mp1_calib_init();
    safe fn stm32_iwdg_init() -> i32;
    safe fn stm32mp1_init_scmi_server();
    safe fn stm32mp1_calib_it_handler(id: u32);
    safe fn stm32_tamp_it_handler();
    safe fn stm32_iwdg_it_handler(id: u32);
    safe fn tzc400_it_handler() -> i32;
    safe fn stm32mp_mask_timer();
    safe fn stm32mp_wait_cpu_reset() -> !;
    /// Makes `context` the non-secure CPU context used on the next world switch.
    fn stm32mp1_install_ns_context(context: *const NonSecureContext);
    safe fn do_panic() -> !;
}

/// Converts the return value of a C driver, negative on failure.
fn check(ret: i32) -> Result<(), Error> {
    if ret < 0 {
        Err(Error::ResourceUnavailable)
    } else {
        Ok(())
    }
}

/// The STMicroelectronics STM32MP15x SoCs.
pub struct Stm32mp1;

impl Platform for Stm32mp1 {
    const TZMA_SYSRAM_RANGE: u16 = match tzma_secure_range(NS_SYSRAM_BASE - SYSRAM_BASE) {
        Some(range) => range,
        None => panic!("Secure SYSRAM size can't be expressed as a TZMA range"),
    };
    const INTERNAL_TAMPER_COUNT: usize = 5;
    const EXTERNAL_TAMPER_COUNT: usize = 3;

    type Drivers = Stm32mp1Drivers;
    type EtzpcRegisters = MmioEtzpc;
    type BackupDomain = TampBackupDomain;
    type ContextStore = BackupSramContextStore;

    fn code_region() -> MemoryRegion {
        let base = (&raw const __TEXT_START__) as usize;
        let end = (&raw const __RODATA_END__) as usize;
        MemoryRegion::new(base, end - base, MemoryAttributes::CODE)
    }

    fn memory_regions() -> &'static [MemoryRegion] {
        &MEMORY_REGIONS
    }

    fn halt() -> ! {
        do_panic()
    }
}

register_bitfields! {
    u32,

    /// RCC APB5 peripheral clock enable set and clear registers
    APB5EN [
        RTCAPBEN OFFSET(8) NUMBITS(1) []
    ],

    /// RCC AHB5 peripheral clock enable set and clear registers
    AHB5EN [
        BKPSRAMEN OFFSET(8) NUMBITS(1) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    RccRegisterBlock {
        (0x000 => _reserved0),
        (0x208 => MP_APB5ENSETR: ReadWrite<u32, APB5EN::Register>),
        (0x20C => MP_APB5ENCLRR: ReadWrite<u32, APB5EN::Register>),
        (0x210 => MP_AHB5ENSETR: ReadWrite<u32, AHB5EN::Register>),
        (0x214 => MP_AHB5ENCLRR: ReadWrite<u32, AHB5EN::Register>),
        (0x218 => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    TampRegisterBlock {
        (0x000 => _reserved0),
        (0x100 => BKPR: [ReadOnly<u32>; 32]),
        (0x180 => @END),
    }
}

fn rcc() -> MmioDerefWrapper<RccRegisterBlock> {
    // SAFETY: RCC_BASE is the address of the RCC, which is mapped as device memory by
    // MEMORY_REGIONS and only accessed through its set and clear registers here.
    unsafe { MmioDerefWrapper::new(RCC_BASE) }
}

/// The TAMP backup registers, behind the RTCAPB clock gate.
pub struct TampBackupDomain {
    tamp: MmioDerefWrapper<TampRegisterBlock>,
}

impl BackupDomain for TampBackupDomain {
    fn enable_access(&mut self) {
        rcc().MP_APB5ENSETR.write(APB5EN::RTCAPBEN::SET);
    }

    fn disable_access(&mut self) {
        rcc().MP_APB5ENCLRR.write(APB5EN::RTCAPBEN::SET);
    }

    fn read(&self, register: BackupRegister) -> u32 {
        self.tamp.BKPR[register.index()].get()
    }
}

/// The non-secure context saved at the start of backup SRAM.
pub struct BackupSramContextStore;

impl BackupSramContextStore {
    const SIZE: usize = 0x1000;
}

impl ContextStore for BackupSramContextStore {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error> {
        let length = buffer.len().min(Self::SIZE);
        rcc().MP_AHB5ENSETR.write(AHB5EN::BKPSRAMEN::SET);
        for (offset, byte) in buffer[..length].iter_mut().enumerate() {
            // SAFETY: Backup SRAM is mapped as device memory and its clock is enabled, and
            // `offset` is within it.
            *byte = unsafe { ptr::read_volatile((BKPSRAM_BASE + offset) as *const u8) };
        }
        rcc().MP_AHB5ENCLRR.write(AHB5EN::BKPSRAMEN::SET);
        Ok(length)
    }

    fn install(&mut self, context: &NonSecureContext) {
        // SAFETY: `context` is a valid reference, which the callee only reads during the call.
        unsafe { stm32mp1_install_ns_context(context) }
    }
}

/// STPMIC1, on I2C.
pub struct Stpmic1;

impl PmicBus for Stpmic1 {
    fn init_controller(&mut self, mode: BusMode) -> Result<(), Error> {
        match mode {
            // There is no RSB controller on STM32MP1.
            BusMode::Rsb => Err(Error::Unsupported),
            BusMode::I2c if initialize_pmic_i2c() => Ok(()),
            BusMode::I2c => Err(Error::ResourceUnavailable),
        }
    }

    fn set_bus_speed(&mut self, _hz: u32) -> Result<(), Error> {
        // The I2C timings come from the device tree.
        Ok(())
    }

    fn set_device_mode(&mut self, _command: u32) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn assign_runtime_address(
        &mut self,
        _hw_address: u16,
        _runtime_address: u8,
    ) -> Result<(), Error> {
        Err(Error::Unsupported)
    }

    fn check_id(&mut self) -> Result<(), Error> {
        let mut version = 0;
        // SAFETY: `version` is a valid pointer for the duration of the call.
        check(unsafe { stpmic1_get_version(&mut version) })?;
        info!("PMIC version {version:#x}");
        Ok(())
    }

    fn setup_regulators(&mut self) -> Result<(), Error> {
        check(pmic_configure_boot_on_regulators())
    }
}

/// Converts memory attributes to those of `mmap_add_region`.
fn xlat_attributes(attributes: MemoryAttributes) -> u32 {
    let mut mt = if attributes.contains(MemoryAttributes::DEVICE) {
        MT_DEVICE
    } else {
        MT_MEMORY
    };
    if attributes.contains(MemoryAttributes::RW) {
        mt |= MT_RW;
    }
    if attributes.contains(MemoryAttributes::NON_SECURE) {
        mt |= MT_NS;
    }
    if attributes.contains(MemoryAttributes::EXECUTE_NEVER) {
        mt |= MT_EXECUTE_NEVER;
    }
    mt
}

extern "C" fn potential_tamper(id: i32) -> u32 {
    warn!("Potential tamper event on tamper {id}");
    0
}

fn c_tamper_table(slots: &TamperSlots) -> ArrayVec<Stm32Tamp, MAX_TAMPER_SLOTS> {
    slots
        .slots()
        .iter()
        .map(|slot| match slot {
            TamperSlot::Unused => Stm32Tamp { id: -1, func: None },
            TamperSlot::Enabled(config) => Stm32Tamp {
                id: config.id as i32,
                func: match config.mode {
                    TamperMode::Confirmed => None,
                    TamperMode::Potential => Some(potential_tamper),
                },
            },
        })
        .collect()
}

/// The C drivers of the STM32MP1 secure peripherals.
pub struct Stm32mp1Drivers {
    pmic: Stpmic1,
}

impl SecureDrivers for Stm32mp1Drivers {
    type Pmic = Stpmic1;

    fn allow_non_secure_abort_masking(&mut self) {
        // SAFETY: SP_MIN runs in monitor mode, where SCR is accessible. Setting AW only changes
        // whether the non-secure world may mask asynchronous aborts.
        unsafe {
            asm!(
                "mrc p15, 0, {scr}, c1, c1, 0",
                "orr {scr}, {scr}, #{aw}",
                "mcr p15, 0, {scr}, c1, c1, 0",
                scr = out(reg) _,
                aw = const SCR_AW,
                options(nostack, preserves_flags),
            );
        }
    }

    fn enable_mmu(&mut self, map: &MemoryMap) -> Result<(), Error> {
        for region in map.regions() {
            let base = region.range.base;
            mmap_add_region(
                base as u64,
                base,
                region.range.size,
                xlat_attributes(region.attributes),
            );
        }
        configure_mmu();
        Ok(())
    }

    fn open_device_tree(&mut self) -> Result<(), Error> {
        check(dt_open_and_check())
    }

    fn probe_fuses(&mut self) -> Result<(), Error> {
        if bsec_probe() == 0 {
            Ok(())
        } else {
            Err(Error::ResourceUnavailable)
        }
    }

    fn probe_clocks(&mut self) -> Result<(), Error> {
        check(stm32mp1_clk_probe())
    }

    fn stdout_uart(&self) -> Option<usize> {
        let mut info = DtNodeInfo {
            base: 0,
            clock: -1,
            reset: -1,
            status: DT_DISABLED,
        };
        // SAFETY: `info` is a valid pointer for the duration of the call.
        let result = unsafe { dt_get_stdout_uart_info(&mut info) };
        (result > 0 && info.status != DT_DISABLED).then_some(info.base as usize)
    }

    fn boot_context(&self) -> BootContext {
        let mut boot = BootContext::default();
        // SAFETY: Both pointers are valid for the duration of the call.
        unsafe { stm32_get_boot_interface(&mut boot.interface, &mut boot.instance) };
        boot
    }

    fn uart_base(&self, instance: u32) -> Option<usize> {
        match get_uart_address(instance) {
            0 => None,
            base => Some(base),
        }
    }

    fn register_console(&mut self, base: usize, scope: ConsoleScope) -> Result<(), Error> {
        // The scope bits are those of `CONSOLE_FLAG_BOOT`, `CONSOLE_FLAG_RUNTIME` and
        // `CONSOLE_FLAG_CRASH`.
        let flags = scope.bits() | CONSOLE_FLAG_TRANSLATE_CRLF;
        if stm32mp1_console_register(base, UART_BAUDRATE, flags) == 0 {
            return Err(Error::ResourceUnavailable);
        }
        Ok(())
    }

    fn pmic(&mut self) -> Option<&mut Stpmic1> {
        (dt_pmic_status() > 0).then_some(&mut self.pmic)
    }

    fn init_low_power_states(&mut self) -> Result<(), Error> {
        stm32mp1_init_lp_states();
        Ok(())
    }

    fn dram(&self) -> Result<AddressRange, Error> {
        match dt_get_ddr_size() {
            0 => Err(Error::ResourceUnavailable),
            size => Ok(AddressRange::new(DDR_BASE, size as usize)),
        }
    }

    fn init_memory_firewall(&mut self) -> Result<(), Error> {
        stm32mp1_security_setup();
        Ok(())
    }

    fn init_generic_timer(&mut self) -> Result<(), Error> {
        generic_delay_timer_init();
        Ok(())
    }

    fn init_interrupt_controller(&mut self) -> Result<(), Error> {
        stm32mp1_gic_init();
        Ok(())
    }

    fn init_rtc(&mut self) -> Result<(), Error> {
        check(stm32_rtc_init())
    }

    fn init_rng(&mut self) -> Result<(), Error> {
        check(stm32_rng_init())
    }

    fn init_tamper(&mut self) -> Result<bool, Error> {
        let ret = stm32_tamp_init();
        check(ret)?;
        Ok(ret > 0)
    }

    fn configure_tampers(
        &mut self,
        internal: &TamperSlots,
        external: &TamperSlots,
        config: ExternalTamperConfig,
    ) -> Result<(), Error> {
        let internal = c_tamper_table(internal);
        let external = c_tamper_table(external);
        // SAFETY: Both tables are valid for the given number of entries for the duration of the
        // calls, and the driver copies what it needs.
        unsafe {
            stm32_tamp_configure_internal(internal.as_ptr(), internal.len() as u32);
            stm32_tamp_configure_external(
                external.as_ptr(),
                external.len() as u32,
                config.filter,
                config.active,
            );
        }
        Ok(())
    }

    fn enable_tamper_timestamp(&mut self) {
        stm32_rtc_set_tamper_timestamp();
    }

    fn init_timer(&mut self) -> Result<(), Error> {
        if stm32_timer_init() == 0 {
            Ok(())
        } else {
            Err(Error::ResourceUnavailable)
        }
    }

    fn init_calibration(&mut self) {
        stm32mp1_calib_init();
    }

    fn init_watchdog(&mut self) -> Result<(), Error> {
        check(stm32_iwdg_init())
    }

    fn init_scmi_server(&mut self) -> Result<(), Error> {
        stm32mp1_init_scmi_server();
        Ok(())
    }
}

/// Secure interrupt handlers of the C drivers.
pub struct Stm32mp1Handlers;

impl SecureInterruptHandlers for Stm32mp1Handlers {
    fn calibrate(&self, int_id: IntId) {
        stm32mp1_calib_it_handler(int_id.into());
    }

    fn tamper(&self) {
        stm32_tamp_it_handler();
    }

    fn watchdog(&self, int_id: IntId) {
        stm32_iwdg_it_handler(int_id.into());
    }

    fn report_security_violation(&self, _int_id: IntId) {
        tzc400_it_handler();
    }

    fn mask_local_timer(&self) {
        stm32mp_mask_timer();
    }

    fn wait_for_reset(&self) -> ! {
        stm32mp_wait_cpu_reset()
    }
}

/// The console registered by the early phase, if any.
struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            console_putc(byte.into());
        }
        Ok(())
    }
}

static CONSOLE: LockedWriter<Console> = LockedWriter::new(Console);

static SEQUENCER: Once<SpinMutex<Sequencer<Stm32mp1>>> = Once::new();

static BL33_EP_INFO: Once<EntryPointInfo> = Once::new();

static DISPATCHER: Dispatcher<GicV2, Stm32mp1Handlers> = Dispatcher::new(
    // SAFETY: These are the addresses of the GIC distributor and CPU interface, which are mapped
    // as device memory by MEMORY_REGIONS, and this is the only GicV2 instance.
    unsafe { GicV2::new(GICD_BASE, GICC_BASE) },
    Stm32mp1Handlers,
    SECURE_INTERRUPT_ROUTES,
    MAX_SPI_ID,
);

fn sequencer() -> &'static SpinMutex<Sequencer<Stm32mp1>> {
    match SEQUENCER.get() {
        Some(sequencer) => sequencer,
        None => {
            error!("SP_MIN platform hook called before early setup");
            Stm32mp1::halt()
        }
    }
}

#[unsafe(no_mangle)]
extern "C" fn sp_min_early_platform_setup2(arg0: usize, _arg1: usize, _arg2: usize, _arg3: usize) {
    // Ignore the error if the logger is already set up.
    let _ = logger::init(&CONSOLE);

    // SAFETY: BL2 passes a `bl_params_t` in arg0, in secure memory which it doesn't touch again.
    let images = unsafe { bl_params::images(arg0 as *const BlParams) };
    let images = or_halt::<Stm32mp1, _>(images.map_err(Fatal::at(Step::Handoff)));
    let sequencer = SEQUENCER.call_once(|| {
        SpinMutex::new(Sequencer::new(
            Stm32mp1Drivers { pmic: Stpmic1 },
            // SAFETY: ETZPC_BASE is the address of the ETZPC, which is mapped as device memory
            // by MEMORY_REGIONS, and this is the only instance of its driver.
            unsafe { MmioEtzpc::new(ETZPC_BASE) },
            TampBackupDomain {
                // SAFETY: TAMP_BASE is the address of the TAMP, which is mapped as device memory
                // by MEMORY_REGIONS, and its backup registers are only read through here.
                tamp: unsafe { MmioDerefWrapper::new(TAMP_BASE) },
            },
            BackupSramContextStore,
        ))
    });
    or_halt::<Stm32mp1, _>(sequencer.lock().early_setup(images));
    console_flush();
}

#[unsafe(no_mangle)]
extern "C" fn sp_min_plat_arch_setup() {}

#[unsafe(no_mangle)]
extern "C" fn sp_min_platform_setup() {
    or_halt::<Stm32mp1, _>(sequencer().lock().late_setup());
}

#[unsafe(no_mangle)]
extern "C" fn sp_min_plat_get_bl33_ep_info() -> *mut EntryPointInfo {
    let target = or_halt::<Stm32mp1, _>(sequencer().lock().next_entry_point());
    let info = BL33_EP_INFO.call_once(|| EntryPointInfo::non_secure(&target));
    // SP_MIN only reads the entry point info.
    ptr::from_ref(info).cast_mut()
}

#[unsafe(no_mangle)]
extern "C" fn sp_min_plat_fiq_handler(id: u32) {
    if let Err(e) = DISPATCHER.dispatch(id) {
        error!("{e}");
        Stm32mp1::halt();
    }
}
