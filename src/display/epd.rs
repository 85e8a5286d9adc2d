//! SSD16xx-family black/white/red e-paper driver.
//!
//! Written against `embedded-hal` 1.0 so it runs on any SPI bus and GPIO
//! implementation; [`super::hardware`] wires it to Linux spidev and gpio-cdev.
//! The controller keeps two RAM planes: `0x24` holds black (bit clear means
//! black) and `0x26` holds red, sent inverted.

use super::{check_frame_size, BorderColour, DisplayDriver, DisplayError};
use crate::publisher::DisplayFrame;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use image::Rgb;

const SW_RESET: u8 = 0x12;
const BORDER_WAVEFORM: u8 = 0x3C;
const TEMPERATURE_SENSOR: u8 = 0x18;
const DATA_ENTRY_MODE: u8 = 0x11;
const RAM_X_WINDOW: u8 = 0x44;
const RAM_Y_WINDOW: u8 = 0x45;
const RAM_X_COUNTER: u8 = 0x4E;
const RAM_Y_COUNTER: u8 = 0x4F;
const WRITE_BLACK_RAM: u8 = 0x24;
const WRITE_RED_RAM: u8 = 0x26;
const UPDATE_CONTROL: u8 = 0x22;
const MASTER_ACTIVATION: u8 = 0x20;
const DEEP_SLEEP: u8 = 0x10;

const BUSY_POLL_MS: u32 = 10;

/// The three inks the panel can show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ink {
    White,
    Black,
    Red,
}

/// Map an RGB pixel onto the nearest panel ink.
///
/// Strongly red pixels become red, anything darker than mid-grey becomes
/// black, everything else is left white.
pub fn quantize(pixel: &Rgb<u8>) -> Ink {
    let [r, g, b] = pixel.0;
    if r > 150 && g < 100 && b < 100 {
        return Ink::Red;
    }
    let luminance = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000;
    if luminance < 128 {
        Ink::Black
    } else {
        Ink::White
    }
}

/// Packed 1-bit black and red planes, one row of `ceil(width / 8)` bytes per line.
#[derive(Clone, Debug, PartialEq)]
pub struct InkPlanes {
    width: u32,
    height: u32,
    black: Vec<u8>,
    red: Vec<u8>,
}

impl InkPlanes {
    /// All-white planes.
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width.div_ceil(8) * height) as usize;
        Self {
            width,
            height,
            black: vec![0xFF; size],
            red: vec![0x00; size],
        }
    }

    pub fn from_frame(frame: &DisplayFrame) -> Self {
        let mut planes = Self::new(frame.width(), frame.height());
        for (x, y, pixel) in frame.as_rgb_image().enumerate_pixels() {
            planes.set_pixel(x, y, quantize(pixel));
        }
        planes
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, ink: Ink) {
        if x >= self.width || y >= self.height {
            return;
        }
        let index = (y * self.width.div_ceil(8) + x / 8) as usize;
        let mask = 0x80 >> (x % 8);
        match ink {
            Ink::White => {
                self.black[index] |= mask;
                self.red[index] &= !mask;
            }
            Ink::Black => {
                self.black[index] &= !mask;
                self.red[index] &= !mask;
            }
            Ink::Red => {
                self.black[index] |= mask;
                self.red[index] |= mask;
            }
        }
    }

    pub fn black(&self) -> &[u8] {
        &self.black
    }

    pub fn red(&self) -> &[u8] {
        &self.red
    }
}

fn border_waveform(colour: BorderColour) -> u8 {
    match colour {
        BorderColour::White => 0x05,
        BorderColour::Black => 0x04,
        BorderColour::Red => 0x06,
    }
}

fn bus_error<E: core::fmt::Debug>(err: E) -> DisplayError {
    DisplayError::Driver(format!("{err:?}"))
}

/// Tri-colour e-paper panel on an SPI bus with DC, RST and BUSY lines.
pub struct EpdDisplay<SPI, DC, RST, BUSY, DELAY> {
    spi: SPI,
    dc: DC,
    rst: RST,
    busy: BUSY,
    delay: DELAY,
    width: u32,
    height: u32,
    busy_timeout_ms: u32,
    border: BorderColour,
    planes: Option<InkPlanes>,
    initialised: bool,
}

impl<SPI, DC, RST, BUSY, DELAY> EpdDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, busy: BUSY, delay: DELAY, width: u32, height: u32) -> Self {
        Self {
            spi,
            dc,
            rst,
            busy,
            delay,
            width,
            height,
            busy_timeout_ms: 30_000,
            border: BorderColour::White,
            planes: None,
            initialised: false,
        }
    }

    /// How long to wait for BUSY to drop before giving up.
    pub fn with_busy_timeout(mut self, timeout_ms: u32) -> Self {
        self.busy_timeout_ms = timeout_ms;
        self
    }

    /// Hardware reset, software reset and full-screen RAM window setup.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        tracing::debug!(width = self.width, height = self.height, "🚀 Initialising e-paper panel");
        self.reset()?;
        self.wait_until_idle()?;
        self.command(SW_RESET)?;
        self.wait_until_idle()?;

        self.command_with_data(BORDER_WAVEFORM, &[border_waveform(self.border)])?;
        self.command_with_data(TEMPERATURE_SENSOR, &[0x80])?;
        self.command_with_data(DATA_ENTRY_MODE, &[0x03])?;

        let x_end = (self.width.div_ceil(8) - 1) as u8;
        let y_end = self.height.saturating_sub(1);
        self.command_with_data(RAM_X_WINDOW, &[0x00, x_end])?;
        self.command_with_data(RAM_Y_WINDOW, &[0x00, 0x00, (y_end % 256) as u8, (y_end / 256) as u8])?;
        self.reset_ram_counters()?;
        self.wait_until_idle()?;

        self.initialised = true;
        Ok(())
    }

    /// Enter deep sleep; the panel keeps its image without power and needs a
    /// hardware reset before the next refresh.
    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.command_with_data(DEEP_SLEEP, &[0x01])?;
        self.initialised = false;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(bus_error)?;
        self.delay.delay_ms(200);
        self.rst.set_low().map_err(bus_error)?;
        self.delay.delay_ms(5);
        self.rst.set_high().map_err(bus_error)?;
        self.delay.delay_ms(200);
        Ok(())
    }

    fn reset_ram_counters(&mut self) -> Result<(), DisplayError> {
        self.command_with_data(RAM_X_COUNTER, &[0x00])?;
        self.command_with_data(RAM_Y_COUNTER, &[0x00, 0x00])
    }

    fn command(&mut self, command: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(bus_error)?;
        self.spi.write(&[command]).map_err(bus_error)
    }

    fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(bus_error)?;
        self.spi.write(data).map_err(bus_error)
    }

    fn command_with_data(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.command(command)?;
        self.data(data)
    }

    fn wait_until_idle(&mut self) -> Result<(), DisplayError> {
        let mut waited = 0;
        while self.busy.is_high().map_err(bus_error)? {
            if waited >= self.busy_timeout_ms {
                tracing::warn!(timeout_ms = self.busy_timeout_ms, "⚠️ BUSY never dropped");
                return Err(DisplayError::Timeout(self.busy_timeout_ms));
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            waited += BUSY_POLL_MS;
        }
        Ok(())
    }
}

impl<SPI, DC, RST, BUSY, DELAY> DisplayDriver for EpdDisplay<SPI, DC, RST, BUSY, DELAY>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BUSY: InputPin,
    DELAY: DelayNs,
{
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_image(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        check_frame_size(frame, self.width, self.height)?;
        self.planes = Some(InkPlanes::from_frame(frame));
        Ok(())
    }

    fn set_border(&mut self, colour: BorderColour) -> Result<(), DisplayError> {
        self.border = colour;
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let planes = self.planes.take().ok_or(DisplayError::NoFrame)?;
        if !self.initialised {
            self.init()?;
        }

        self.command_with_data(BORDER_WAVEFORM, &[border_waveform(self.border)])?;
        self.reset_ram_counters()?;
        self.command_with_data(WRITE_BLACK_RAM, planes.black())?;
        let red: Vec<u8> = planes.red().iter().map(|b| !b).collect();
        self.command_with_data(WRITE_RED_RAM, &red)?;

        self.command_with_data(UPDATE_CONTROL, &[0xF7])?;
        self.command(MASTER_ACTIVATION)?;
        self.wait_until_idle()?;

        tracing::debug!(
            black = planes.black().iter().map(|b| b.count_zeros()).sum::<u32>(),
            red = planes.red().iter().map(|b| b.count_ones()).sum::<u32>(),
            "✅ Panel refreshed"
        );
        self.planes = Some(planes);
        self.sleep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::spi::Operation;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    enum Write {
        Command(u8),
        Data(Vec<u8>),
    }

    #[derive(Default)]
    struct Bus {
        data_mode: Cell<bool>,
        writes: RefCell<Vec<Write>>,
        busy_polls_left: Cell<u32>,
        always_busy: Cell<bool>,
    }

    struct MockSpi(Rc<Bus>);
    struct MockDc(Rc<Bus>);
    struct MockPin;
    struct MockBusy(Rc<Bus>);
    struct MockDelay;

    impl embedded_hal::spi::ErrorType for MockSpi {
        type Error = Infallible;
    }

    impl SpiDevice for MockSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            for op in operations {
                if let Operation::Write(bytes) = op {
                    let write = if self.0.data_mode.get() {
                        Write::Data(bytes.to_vec())
                    } else {
                        Write::Command(bytes[0])
                    };
                    self.0.writes.borrow_mut().push(write);
                }
            }
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MockDc {
        type Error = Infallible;
    }

    impl OutputPin for MockDc {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.data_mode.set(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.data_mode.set(true);
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    impl embedded_hal::digital::ErrorType for MockBusy {
        type Error = Infallible;
    }

    impl InputPin for MockBusy {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            if self.0.always_busy.get() {
                return Ok(true);
            }
            let left = self.0.busy_polls_left.get();
            self.0.busy_polls_left.set(left.saturating_sub(1));
            Ok(left > 0)
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|high| !high)
        }
    }

    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    type TestEpd = EpdDisplay<MockSpi, MockDc, MockPin, MockBusy, MockDelay>;

    fn panel(width: u32, height: u32) -> (TestEpd, Rc<Bus>) {
        let bus = Rc::new(Bus::default());
        let epd = EpdDisplay::new(
            MockSpi(bus.clone()),
            MockDc(bus.clone()),
            MockPin,
            MockBusy(bus.clone()),
            MockDelay,
            width,
            height,
        );
        (epd, bus)
    }

    fn commands(bus: &Bus) -> Vec<u8> {
        bus.writes
            .borrow()
            .iter()
            .filter_map(|w| match w {
                Write::Command(c) => Some(*c),
                Write::Data(_) => None,
            })
            .collect()
    }

    fn data_after(bus: &Bus, command: u8) -> Vec<Vec<u8>> {
        let writes = bus.writes.borrow();
        writes
            .iter()
            .enumerate()
            .filter(|(_, w)| **w == Write::Command(command))
            .filter_map(|(i, _)| match writes.get(i + 1) {
                Some(Write::Data(d)) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn quantizes_to_three_inks() {
        assert_eq!(quantize(&Rgb([255, 0, 0])), Ink::Red);
        assert_eq!(quantize(&Rgb([200, 60, 60])), Ink::Red);
        assert_eq!(quantize(&Rgb([31, 119, 180])), Ink::Black);
        assert_eq!(quantize(&Rgb([0, 0, 0])), Ink::Black);
        assert_eq!(quantize(&Rgb([176, 176, 176])), Ink::White);
        assert_eq!(quantize(&Rgb([255, 255, 255])), Ink::White);
    }

    #[test]
    fn planes_pack_msb_first() {
        let mut planes = InkPlanes::new(16, 2);
        planes.set_pixel(0, 0, Ink::Black);
        planes.set_pixel(9, 1, Ink::Red);
        planes.set_pixel(99, 99, Ink::Black);
        assert_eq!(planes.black(), &[0x7F, 0xFF, 0xFF, 0xFF]);
        assert_eq!(planes.red(), &[0x00, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn show_initialises_then_writes_both_planes() {
        let (mut epd, bus) = panel(16, 2);
        let mut frame = DisplayFrame::blank(16, 2);
        frame.put_pixel(0, 0, Rgb([0, 0, 0]));
        frame.put_pixel(8, 1, Rgb([255, 0, 0]));

        epd.set_image(&frame).unwrap();
        epd.set_border(BorderColour::Black).unwrap();
        epd.show().unwrap();

        let cmds = commands(&bus);
        assert_eq!(cmds[0], SW_RESET);
        assert!(cmds.ends_with(&[
            BORDER_WAVEFORM,
            RAM_X_COUNTER,
            RAM_Y_COUNTER,
            WRITE_BLACK_RAM,
            WRITE_RED_RAM,
            UPDATE_CONTROL,
            MASTER_ACTIVATION,
            DEEP_SLEEP,
        ]));
        assert_eq!(data_after(&bus, RAM_X_WINDOW), vec![vec![0x00, 0x01]]);
        assert_eq!(data_after(&bus, RAM_Y_WINDOW), vec![vec![0x00, 0x00, 0x01, 0x00]]);
        assert_eq!(data_after(&bus, WRITE_BLACK_RAM), vec![vec![0x7F, 0xFF, 0xFF, 0xFF]]);
        assert_eq!(data_after(&bus, WRITE_RED_RAM), vec![vec![0xFF, 0xFF, 0xFF, 0x7F]]);
        assert_eq!(data_after(&bus, BORDER_WAVEFORM).last(), Some(&vec![0x04]));
    }

    #[test]
    fn panel_sleeps_after_refresh_and_wakes_with_reset() {
        let (mut epd, bus) = panel(8, 1);
        epd.set_image(&DisplayFrame::blank(8, 1)).unwrap();
        epd.show().unwrap();
        assert_eq!(data_after(&bus, DEEP_SLEEP), vec![vec![0x01]]);
        bus.writes.borrow_mut().clear();

        epd.set_image(&DisplayFrame::blank(8, 1)).unwrap();
        epd.show().unwrap();
        let cmds = commands(&bus);
        assert_eq!(cmds.first(), Some(&SW_RESET));
        assert_eq!(cmds.last(), Some(&DEEP_SLEEP));
    }

    #[test]
    fn show_without_image_fails() {
        let (mut epd, _bus) = panel(8, 1);
        assert!(matches!(epd.show(), Err(DisplayError::NoFrame)));
    }

    #[test]
    fn wrong_frame_size_is_rejected() {
        let (mut epd, _bus) = panel(800, 480);
        let result = epd.set_image(&DisplayFrame::blank(400, 300));
        assert!(matches!(result, Err(DisplayError::SizeMismatch { .. })));
    }

    #[test]
    fn waits_out_short_busy_periods() {
        let (epd, bus) = panel(8, 1);
        let mut epd = epd.with_busy_timeout(100);
        bus.busy_polls_left.set(5);
        assert!(epd.init().is_ok());
    }

    #[test]
    fn stuck_busy_line_times_out() {
        let (epd, bus) = panel(8, 1);
        let mut epd = epd.with_busy_timeout(50);
        bus.always_busy.set(true);
        epd.set_image(&DisplayFrame::blank(8, 1)).unwrap();
        assert!(matches!(epd.show(), Err(DisplayError::Timeout(50))));
    }
}
