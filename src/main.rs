//! PowerBridge Firmware: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspUart (SerialPort)   SystemClock (Clock)   TemperatureBus   │
//! │  Ina226 (PowerSensor)   Aht25 → ClimatePoller                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  link-rx ──▶ Transport/RxPump ──▶ ProtocolHandler ──▶ RESP     │
//! │                                         │                      │
//! │                    MeasurementSession ◀─┴─▶ proto-stream NOTIFY │
//! │                          ▲                                     │
//! │            INA226 ALERT ─┘ (ISR flag, drained by `session`)    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use esp_idf_svc::hal::delay::Delay;
use esp_idf_svc::hal::gpio::{InterruptType, PinDriver, Pull};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::hal::uart::{self, UartDriver};
use log::{info, warn};

use powerbridge::adapters::event_bus::TemperatureBus;
use powerbridge::adapters::time::SystemClock;
use powerbridge::adapters::uart::EspUart;
use powerbridge::config::{LinkConfig, SessionDefaults};
use powerbridge::drivers::ina226::{self, Ina226};
use powerbridge::drivers::task_pin::{self, Core};
use powerbridge::link::io_task;
use powerbridge::link::transport::Transport;
use powerbridge::measurement::{MeasurementSession, SessionConfig};
use powerbridge::protocol::ProtocolHandler;
use powerbridge::sensors::aht25::Aht25;
use powerbridge::sensors::{CLIMATE_INTERVAL_MS, ClimatePoller};

const STATS_INTERVAL: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("MAIN: PowerBridge v{}", env!("CARGO_PKG_VERSION"));

    let link_cfg = LinkConfig::default();
    link_cfg.validate().map_err(anyhow::Error::msg)?;
    let defaults = SessionDefaults::default();

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    // ── Link UART ─────────────────────────────────────────────
    let flow = if link_cfg.flow_control {
        uart::config::FlowControl::CTS_RTS
    } else {
        uart::config::FlowControl::None
    };
    let uart_config = uart::config::Config::default()
        .baudrate(Hertz(link_cfg.baud_rate))
        .flow_control(flow);
    let driver = UartDriver::new(
        peripherals.uart1,
        pins.gpio17,
        pins.gpio18,
        Some(pins.gpio19),
        Some(pins.gpio20),
        &uart_config,
    )?;
    let port = EspUart::new(driver)?;

    let (transport, pump) = Transport::new(port, &link_cfg)?;
    let events = Arc::downgrade(&transport);
    transport.serial().set_event_handler(Box::new(move |event| {
        if let Some(t) = events.upgrade() {
            t.on_serial_event(event);
        }
    }));

    // ── Power sensor ──────────────────────────────────────────
    let i2c_cfg = I2cConfig::new().baudrate(400.kHz().into());
    let power_i2c = I2cDriver::new(peripherals.i2c0, pins.gpio8, pins.gpio9, &i2c_cfg)?;
    let ina = Ina226::new(power_i2c, Delay::new_default(), ina226::DEFAULT_ADDRESS);

    let clock = SystemClock::new();
    let session = Arc::new(MeasurementSession::new(ina, clock.clone()));

    let mut alert = PinDriver::input(pins.gpio10)?;
    alert.set_pull(Pull::Up)?;
    alert.set_interrupt_type(InterruptType::NegEdge)?;
    let isr_session = Arc::clone(&session);
    // SAFETY: the callback only raises an atomic flag.
    unsafe { alert.subscribe(move || isr_session.on_data_ready())? };
    alert.enable_interrupt()?;

    if defaults.autostart {
        let cfg = SessionConfig::from_raw(defaults.duration_sec, defaults.sample_period_ms)
            .map_err(powerbridge::Error::from)?;
        session.start(cfg).map_err(powerbridge::Error::from)?;
    }

    let worker_session = Arc::clone(&session);
    let _session_task = task_pin::spawn_poller(
        Core::App,
        8,
        4,
        "session\0",
        defaults.process_interval_ms,
        move || {
            worker_session.process();
            // The GPIO driver disarms the interrupt after each edge.
            if let Err(e) = alert.enable_interrupt() {
                warn!("MAIN: ALERT re-arm failed: {}", e);
            }
        },
    )?;

    // ── Climate ───────────────────────────────────────────────
    let bus = Arc::new(TemperatureBus::new());
    let climate_i2c = I2cDriver::new(peripherals.i2c1, pins.gpio4, pins.gpio5, &i2c_cfg)?;
    let mut climate = ClimatePoller::new(Aht25::new(climate_i2c, Delay::new_default()));
    let climate_bus = Arc::clone(&bus);
    let _climate_task = task_pin::spawn_poller(
        Core::App,
        3,
        4,
        "climate\0",
        CLIMATE_INTERVAL_MS,
        move || {
            climate.tick(&climate_bus);
        },
    )?;

    // ── Protocol ──────────────────────────────────────────────
    let handler = Arc::new(ProtocolHandler::new(
        Arc::clone(&transport),
        Arc::clone(&session),
        &link_cfg,
    ));
    handler.init(bus.as_ref());

    let rx_handler = Arc::clone(&handler);
    let _rx_task = io_task::spawn(pump, clock, link_cfg.rx_poll_interval_ms, move |payload| {
        rx_handler.handle_packet(payload);
    })?;

    info!("MAIN: link up at {} baud", link_cfg.baud_rate);

    loop {
        std::thread::sleep(STATS_INTERVAL);
        let s = transport.stats();
        info!(
            "MAIN: tx={} rx={} crc={} framing={} timeout={} line={} streaming={}",
            s.packets_sent,
            s.packets_received,
            s.crc_errors,
            s.framing_errors,
            s.timeout_errors,
            s.line_errors,
            handler.is_streaming()
        );
    }
}
