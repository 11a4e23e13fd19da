use std::sync::Arc;

use pc_peripherals::{MachineConfig, MachineError, System, SystemClock};

const BANNER: &[u8] = b"PC peripherals ready";
const TEXT_BASE: u32 = 0xB8000;

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

/// Same sequence a PC/AT BIOS uses: vectors 08h and 70h, slave on IRQ 2.
fn init_interrupt_controllers(sys: &mut System) {
    for (port, words) in [(0x20, [0x11, 0x08, 0x04, 0x01]), (0xA0, [0x11, 0x70, 0x02, 0x01])] {
        sys.bus.port_out(words[0], port);
        for word in &words[1..] {
            sys.bus.port_out(*word, port + 1);
        }
    }
}

fn run() -> Result<(), MachineError> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };

    let mut sys = System::new(&cfg, Arc::new(SystemClock))?;
    init_interrupt_controllers(&mut sys);

    for (i, ch) in BANNER.iter().enumerate() {
        sys.bus.write_8(TEXT_BASE + i as u32 * 2, *ch);
        sys.bus.write_8(TEXT_BASE + i as u32 * 2 + 1, 0x1F);
    }

    // Timer tick on IRQ 0, RTC on IRQ 8.
    sys.bus.raise_irq(0);
    sys.bus.raise_irq(8);
    while let Some(vector) = sys.bus.next_pending_vector() {
        log::info!("Interrupt vector {vector:02X}");
        if vector >= 0x78 {
            sys.bus.port_out(0x20, 0xA0);
        }
        sys.bus.port_out(0x20, 0x20);
    }

    for _ in 0..10_000 {
        sys.update(4);
    }

    let Some(renderer) = sys.frame_renderer() else {
        log::info!("No display adapter installed");
        return Ok(());
    };

    if let Some(display) = sys.display_mut() {
        display.take_snapshot();
    }

    renderer.render(|width, height, _pixels| {
        log::info!("Rendered {width}x{height} frame");
    });

    Ok(())
}
