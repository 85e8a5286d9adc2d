//! Linux wiring for the e-paper panel: spidev for the bus and gpio-cdev
//! lines for DC, RST and BUSY.
//!
//! Only built with the `hardware` feature. Pin numbers are GPIO line
//! offsets on `gpio_chip` (BCM numbering on a Raspberry Pi).

use super::epd::EpdDisplay;
use super::DisplayError;
use crate::config::{DisplayConfig, HardwareConfig};
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{CdevPin, Delay, SpidevDevice};

const CONSUMER: &str = "tide-panel";
const SPI_SPEED_HZ: u32 = 4_000_000;

pub type LinuxEpd = EpdDisplay<SpidevDevice, CdevPin, CdevPin, CdevPin, Delay>;

fn open_spi(hw: &HardwareConfig) -> Result<SpidevDevice, DisplayError> {
    let mut spi = SpidevDevice::open(&hw.spi_device)
        .map_err(|e| DisplayError::NotFound(format!("{}: {e:?}", hw.spi_device.display())))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_SPEED_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)
        .map_err(|e| DisplayError::Driver(format!("configuring SPI: {e:?}")))?;
    Ok(spi)
}

fn request_line(chip: &mut Chip, offset: u32, flags: LineRequestFlags) -> Result<CdevPin, DisplayError> {
    let handle = chip
        .get_line(offset)
        .and_then(|line| line.request(flags, 0, CONSUMER))
        .map_err(|e| DisplayError::Driver(format!("requesting GPIO line {offset}: {e:?}")))?;
    CdevPin::new(handle).map_err(|e| DisplayError::Driver(format!("GPIO line {offset}: {e:?}")))
}

/// Open the bus and pins named in `config` and return an uninitialised panel.
///
/// The panel is initialised on each `show()` and sleeps after refreshing.
pub fn open(config: &DisplayConfig) -> Result<LinuxEpd, DisplayError> {
    let hw = &config.hardware;
    let spi = open_spi(hw)?;
    let mut chip = Chip::new(&hw.gpio_chip)
        .map_err(|e| DisplayError::NotFound(format!("{}: {e:?}", hw.gpio_chip.display())))?;

    let dc = request_line(&mut chip, hw.dc_pin, LineRequestFlags::OUTPUT)?;
    let rst = request_line(&mut chip, hw.rst_pin, LineRequestFlags::OUTPUT)?;
    let busy = request_line(&mut chip, hw.busy_pin, LineRequestFlags::INPUT)?;

    tracing::info!(
        spi = %hw.spi_device.display(),
        dc = hw.dc_pin,
        rst = hw.rst_pin,
        busy = hw.busy_pin,
        "🔌 E-paper panel opened"
    );
    Ok(
        EpdDisplay::new(spi, dc, rst, busy, Delay, config.width, config.height)
            .with_busy_timeout(hw.busy_timeout_ms),
    )
}
