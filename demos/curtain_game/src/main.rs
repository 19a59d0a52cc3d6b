//! Curtain Reflex Game
//!
//! A console reflex game driven by curtain-core.
//! - Tuning presets loaded from RON files
//! - The attacker shows tells, feints, or steps out from behind the curtain
//! - Hold SPACE to guard; guard right after it steps out to reflect
//! - Stay unguarded to build courage and clear the run
//!
//! Usage: `curtain_game [preset]` (defaults to the first preset found).
//! Logs go to `curtain_game.log`; set `CURTAIN_LOG` to change the filter.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{
        self, Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use curtain_core::{
    Event as GameEvent, EventSink, ExposureState, Game, GameConfig, GameResult, GameRng,
    GuardInput, GuardSignal, MonotonicClock, Outcome, TimeSource, Timestamp,
};
use curtain_script::{Loader, Presets};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{stdout, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Frame pacing for input polling and redraws
const FRAME_MS: u64 = 16;
const LOG_FILE: &str = "curtain_game.log";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging()?;

    let presets = load_presets()?;
    let requested = std::env::args().nth(1);
    let (name, config) = match requested.as_deref() {
        Some(name) => (name.to_string(), presets.require(name)?.clone()),
        None => presets
            .first()
            .map(|(name, config)| (name.to_string(), config.clone()))
            .ok_or("No presets found in data directory")?,
    };
    info!(preset = %name, "starting");

    // Initialize terminal
    terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;

    // Press/release reporting lets SPACE be held; otherwise it toggles
    let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
    if enhanced {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    // Run game
    let result = run_game(&mut stdout, &name, config, enhanced);

    // Restore terminal
    if enhanced {
        execute!(stdout, PopKeyboardEnhancementFlags)?;
    }
    execute!(stdout, Show, LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    result
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_env("CURTAIN_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let file = File::create(LOG_FILE)?;

    // The terminal belongs to the game, so logs go to a file
    install_subscriber(filter, Mutex::new(file))
}

fn install_subscriber<W>(filter: EnvFilter, writer: W) -> Result<(), Box<dyn std::error::Error>>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| format!("Could not install the log subscriber: {}", e))?;
    Ok(())
}

fn load_presets() -> Result<Presets, Box<dyn std::error::Error>> {
    // Try multiple paths for the data directory
    let paths = ["demos/curtain_game/data", "data", "../data"];

    for path in &paths {
        if Path::new(path).is_dir() {
            let mut loader = Loader::new();
            loader.load_directory(path)?;
            return Ok(loader.finish());
        }
    }

    Err("Could not find the presets data directory".into())
}

fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

/// Keyboard guard edges, stamped when the key event is read
struct GuardKeys {
    hold_to_guard: bool,
    held: bool,
    pending: VecDeque<(GuardSignal, Timestamp)>,
}

impl GuardKeys {
    fn new(hold_to_guard: bool) -> Self {
        Self {
            hold_to_guard,
            held: false,
            pending: VecDeque::new(),
        }
    }

    fn on_space(&mut self, kind: KeyEventKind, at: Timestamp) {
        let signal = match (self.hold_to_guard, kind, self.held) {
            (_, KeyEventKind::Repeat, _) => return,
            (true, KeyEventKind::Press, false) => GuardSignal::Started,
            (true, KeyEventKind::Release, true) => GuardSignal::Cancelled,
            (false, KeyEventKind::Press, false) => GuardSignal::Started,
            (false, KeyEventKind::Press, true) => GuardSignal::Cancelled,
            _ => return,
        };
        self.held = signal == GuardSignal::Started;
        self.pending.push_back((signal, at));
    }

    /// The core drops the guard when a round resolves
    fn sync(&mut self, guarding: bool) {
        if !self.hold_to_guard {
            self.held = guarding;
        }
    }
}

impl GuardInput for GuardKeys {
    fn poll(&mut self) -> Option<(GuardSignal, Timestamp)> {
        self.pending.pop_front()
    }
}

/// What the screen shows, updated from game events
#[derive(Default)]
struct Screen {
    banner: Option<(String, Color)>,
    reflects: u32,
    blocks: u32,
    feints: u32,
    smiling: bool,
}

impl EventSink for Screen {
    fn emit(&mut self, event: &GameEvent) {
        match event {
            GameEvent::PreambleBeat { beat, .. } => {
                self.banner = Some((format!("The curtain twitches... ({})", beat), Color::DarkYellow));
            }
            GameEvent::FeintStarted { .. } => {
                self.banner = Some(("A shadow moves!".to_string(), Color::Yellow));
            }
            GameEvent::FeintResolved { .. } => {
                self.feints += 1;
                self.banner = Some(("...only a feint.".to_string(), Color::Grey));
            }
            GameEvent::ExposureOpened { .. } => {
                self.banner = Some(("!!! IT STEPS OUT !!!".to_string(), Color::Red));
            }
            GameEvent::ReactionJudged { outcome, delay_ms, .. } => {
                let (text, color) = match outcome {
                    Outcome::Reflected => {
                        self.reflects += 1;
                        (format!("REFLECTED! ({} ms)", delay_ms), Color::Green)
                    }
                    Outcome::Blocked => {
                        self.blocks += 1;
                        (format!("Blocked ({} ms)", delay_ms), Color::Cyan)
                    }
                    Outcome::Burned => ("BURNED!".to_string(), Color::Red),
                    Outcome::Missed => ("Caught off guard!".to_string(), Color::Red),
                    Outcome::Cleared => ("Cleared!".to_string(), Color::Green),
                };
                self.banner = Some((text, color));
            }
            GameEvent::RoundResolved { .. } => self.banner = None,
            GameEvent::ThresholdCrossed { .. } => self.smiling = true,
            GameEvent::PreambleEnded { .. }
            | GameEvent::GameOver { .. }
            | GameEvent::ExposureClosed { .. }
            | GameEvent::ProgressChanged { .. } => {}
        }
    }
}

fn run_game(
    stdout: &mut std::io::Stdout,
    preset: &str,
    config: GameConfig,
    hold_to_guard: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    render_welcome(stdout, preset, hold_to_guard)?;
    if !wait_for_any_key()? {
        return Ok(());
    }

    let clock = MonotonicClock::new();
    let mut game = Game::new(config, Box::new(GameRng::new(seed())), Screen::default(), clock.now())?;
    let mut keys = GuardKeys::new(hold_to_guard);

    // Game loop
    loop {
        // Check for input (non-blocking)
        if event::poll(Duration::from_millis(FRAME_MS))? {
            if let Event::Key(key_event) = event::read()? {
                match key_event.code {
                    KeyCode::Esc => {
                        info!("quit by player");
                        return Ok(());
                    }
                    KeyCode::Char('c') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                        return Ok(());
                    }
                    KeyCode::Char(' ') => keys.on_space(key_event.kind, clock.now()),
                    _ => {}
                }
            }
        }

        game.pump(&mut keys);
        let step = game.advance(&clock);
        if let Some(violation) = step.violation {
            warn!(%violation, "input dropped");
        }
        keys.sync(game.judge().is_guarding());

        render_game_state(stdout, &game)?;

        if let Some(result) = game.result() {
            render_final_results(stdout, &game, result)?;
            wait_for_any_key()?;
            return Ok(());
        }
    }
}

/// Wait for a key press; false if the player asked to quit
fn wait_for_any_key() -> Result<bool, Box<dyn std::error::Error>> {
    loop {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                return Ok(key.code != KeyCode::Esc);
            }
        }
    }
}

fn render_welcome(
    stdout: &mut std::io::Stdout,
    preset: &str,
    hold_to_guard: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

    let title = r#"
    +------------------------------------------------------------+
    |                                                            |
    |                  BEHIND THE CURTAIN                        |
    |                                                            |
    +------------------------------------------------------------+
    |                                                            |
    |    HOW TO PLAY:                                            |
    |    * Something is hiding behind the curtain                |
    |    * It twitches before it moves, and sometimes feints     |
    |    * Guard as soon as it steps out                         |
    |    * A quick guard reflects, a slow one still blocks       |
    |    * Too slow and you get burned                           |
    |    * Stay unguarded to build courage and win               |
    |    * ESC to quit                                           |
    |                                                            |
    +------------------------------------------------------------+
"#;

    let control = if hold_to_guard {
        "HOLD SPACE to guard"
    } else {
        "Press SPACE to raise or lower your guard"
    };

    execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print(title),
        ResetColor,
        Print(format!("\n        Preset: {}\n", preset)),
        Print(format!("        {}\n\n", control)),
        Print("                    Press any key to start...\n")
    )?;
    stdout.flush()?;
    Ok(())
}

fn render_game_state(
    stdout: &mut std::io::Stdout,
    game: &Game<Screen>,
) -> Result<(), Box<dyn std::error::Error>> {
    let judge = game.judge();
    let screen = game.sink();
    let max_burns = game.config().judge.max_burn_count;

    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

    // Header
    execute!(
        stdout,
        SetForegroundColor(Color::Yellow),
        Print("========================================================================\n"),
        Print("                          BEHIND THE CURTAIN                            \n"),
        Print("========================================================================\n\n"),
        ResetColor
    )?;

    // Courage bar
    let progress = judge.progress();
    let bar_width = 40;
    let filled = ((progress.fraction() * bar_width as f64) as usize).min(bar_width);
    let courage_color = if screen.smiling {
        Color::Green
    } else {
        Color::Blue
    };

    execute!(
        stdout,
        Print("  Courage: "),
        SetForegroundColor(courage_color),
        Print(format!("{:5.1}/{:<5.1} ", progress.value(), progress.target())),
        SetBackgroundColor(courage_color),
        Print(" ".repeat(filled)),
        SetBackgroundColor(Color::DarkGrey),
        Print(" ".repeat(bar_width - filled)),
        ResetColor,
        Print("\n\n")
    )?;

    // Burns
    execute!(
        stdout,
        Print("  Burns: "),
        SetForegroundColor(Color::Red),
        Print("#".repeat(judge.burns() as usize)),
        SetForegroundColor(Color::DarkGrey),
        Print(".".repeat(max_burns.saturating_sub(judge.burns()) as usize)),
        ResetColor,
        Print(format!(
            "    Reflected: {}  Blocked: {}  Feints: {}\n\n",
            screen.reflects, screen.blocks, screen.feints
        ))
    )?;

    // The curtain
    let (curtain, color) = match game.scheduler().state() {
        ExposureState::Hidden => ("  |||||||||||||||||||||  ", Color::DarkRed),
        ExposureState::Preamble => ("  ||||||||||)||||||||||  ", Color::DarkYellow),
        ExposureState::Feinting => ("  |||||||||(  )||||||||  ", Color::Yellow),
        ExposureState::Exposed => ("  |||||||  (O_O)  ||||||  ", Color::Red),
        ExposureState::Cooldown => ("  ||||||||||||||||||||| ", Color::DarkRed),
    };
    execute!(
        stdout,
        SetForegroundColor(color),
        Print(format!("      {}\n", curtain)),
        Print(format!("      {}\n", curtain)),
        Print(format!("      {}\n\n", curtain)),
        ResetColor
    )?;

    // You
    let (you, you_color) = if judge.is_guarding() {
        ("[#] GUARDING", Color::Cyan)
    } else if screen.smiling {
        ("(^_^)", Color::Green)
    } else {
        ("(o_o)", Color::White)
    };
    execute!(
        stdout,
        SetForegroundColor(you_color),
        Print(format!("               {}\n\n", you)),
        ResetColor
    )?;

    if let Some((text, color)) = &screen.banner {
        execute!(
            stdout,
            SetForegroundColor(*color),
            Print(format!("  {}\n", text)),
            ResetColor
        )?;
    }

    // Instructions
    execute!(
        stdout,
        Print("\n"),
        SetForegroundColor(Color::DarkGrey),
        Print("  SPACE to guard | ESC to quit\n"),
        ResetColor
    )?;

    stdout.flush()?;
    Ok(())
}

fn render_final_results(
    stdout: &mut std::io::Stdout,
    game: &Game<Screen>,
    result: GameResult,
) -> Result<(), Box<dyn std::error::Error>> {
    let screen = game.sink();

    execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

    let (headline, color) = match result {
        GameResult::Win => ("    |          YOU STOOD YOUR GROUND!                 |\n", Color::Green),
        GameResult::Lose => ("    |              GAME OVER                          |\n", Color::Red),
    };

    execute!(
        stdout,
        SetForegroundColor(color),
        Print("\n\n"),
        Print("    +-------------------------------------------------+\n"),
        Print("    |                                                 |\n"),
        Print(headline),
        Print("    |                                                 |\n"),
        Print("    +-------------------------------------------------+\n"),
        ResetColor,
        Print("\n\n")
    )?;

    execute!(
        stdout,
        Print(format!("    Time:      {}\n", game.clock().now)),
        Print(format!("    Rounds:    {}\n", game.judge().rounds())),
        Print(format!("    Reflected: {}\n", screen.reflects)),
        Print(format!("    Blocked:   {}\n", screen.blocks)),
        Print(format!("    Burns:     {}\n", game.judge().burns())),
        Print(format!("    Feints:    {}\n", screen.feints)),
        Print("\n\n    Press any key to exit...\n")
    )?;

    stdout.flush()?;
    Ok(())
}
