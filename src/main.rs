#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The craftos-sound CLI requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod cli {
    use std::env;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use anyhow::{bail, Context};
    use craftos_sound::{
        AudioDevice, Mixer, SoftMixer, SoundConfig, SoundPlugin, TapeDrive, TapeOptions,
        TapeState, WaveArg, BASE_SAMPLE_RATE,
    };
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    const USAGE: &str = "Usage:
  craftos-sound [--config <file.json>] tone <wave> <frequency> <seconds> [volume]
  craftos-sound tape <file.ctdt> [speed]

Waves: none, sine, triangle, sawtooth, rsawtooth, square, noise, pitched_noise

Examples:
  craftos-sound tone sine 440 2
  craftos-sound tone square 220 1.5 0.4
  craftos-sound tape music.ctdt 1.5

Set RUST_LOG=debug to see mixer and tape events.";

    /// How often the tape command checks whether playback ended
    const TAPE_POLL: Duration = Duration::from_millis(50);

    fn parse<T: std::str::FromStr>(value: Option<&String>, what: &str) -> anyhow::Result<T> {
        let value = value.with_context(|| format!("missing {}", what))?;
        value
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid {}: {}", what, value))
    }

    fn tone(config: SoundConfig, args: &[String]) -> anyhow::Result<()> {
        let wave = args.first().context("missing wave type")?;
        let frequency: i64 = parse(args.get(1), "frequency")?;
        let seconds: f64 = parse(args.get(2), "duration")?;
        let volume: f64 = match args.get(3) {
            Some(_) => parse(args.get(3), "volume")?,
            None => 1.0,
        };

        let mixer = Arc::new(SoftMixer::default());
        let plugin = SoundPlugin::new(mixer.clone(), config);
        let bank = plugin.open(0)?;
        bank.set_wave_type(1, wave, WaveArg::None)?;
        bank.set_frequency(1, frequency)?;
        bank.set_volume(1, volume)?;

        let _device = AudioDevice::new(mixer.clone())?;
        info!(wave = %wave, frequency, seconds, volume, "playing tone");
        println!(
            "Playing {} at {} Hz for {:.2}s ({} channels per bank, {} Hz output)",
            wave,
            frequency,
            seconds,
            bank.len(),
            mixer.spec().sample_rate
        );

        // Fade out over the last tenth to avoid a click at the end
        let fade = (seconds * 0.1).min(0.25);
        thread::sleep(Duration::from_secs_f64((seconds - fade).max(0.0)));
        bank.fade_out(1, fade)?;
        thread::sleep(Duration::from_secs_f64(fade));

        drop(bank);
        plugin.close(0);
        Ok(())
    }

    fn tape(args: &[String]) -> anyhow::Result<()> {
        let path = args.first().context("missing tape file")?;
        let speed: f64 = match args.get(1) {
            Some(_) => parse(args.get(1), "speed")?,
            None => 1.0,
        };
        if !std::path::Path::new(path).exists() {
            bail!("tape file not found: {}", path);
        }

        let mixer = Arc::new(SoftMixer::default());
        let mut drive = TapeDrive::new(mixer.clone(), TapeOptions::new().with_path(path))
            .with_context(|| format!("failed to load tape '{}'", path))?;
        drive.set_speed(speed)?;

        let label = drive.get_label();
        let seconds = (drive.get_size() * 8) as f64 / (BASE_SAMPLE_RATE as f64 * speed);
        println!(
            "Tape:     {}\nLabel:    {}\nSize:     {} bytes\nDuration: {:.1}s at {}x",
            path,
            if label.is_empty() { "(none)" } else { label.as_str() },
            drive.get_size(),
            seconds,
            speed
        );

        let _device = AudioDevice::new(mixer)?;
        drive.play()?;
        while drive.get_state() == TapeState::Playing {
            thread::sleep(TAPE_POLL);
        }
        println!("\nPlayback complete!");
        Ok(())
    }

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();

        let mut config = SoundConfig::default();
        let mut rest: Vec<String> = Vec::new();
        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{}", USAGE);
                    return Ok(());
                }
                "--config" => {
                    let path = args.next().context("--config requires a file")?;
                    config = SoundConfig::load(&path)
                        .with_context(|| format!("failed to load config '{}'", path))?;
                }
                _ => rest.push(arg),
            }
        }

        match rest.first().map(String::as_str) {
            Some("tone") => tone(config, &rest[1..]),
            Some("tape") => tape(&rest[1..]),
            Some(other) => {
                eprintln!("Unknown command: {}\n\n{}", other, USAGE);
                Ok(())
            }
            None => {
                eprintln!("{}", USAGE);
                Ok(())
            }
        }
    }
}

#[cfg(feature = "streaming")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
