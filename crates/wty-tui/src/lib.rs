mod app;
mod ui;

pub use app::{Action, App};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use wty_backend::ExportFormat;
use wty_engine::AdminConsole;

use app::InputMode;

/// Runs the interactive console until the user quits. Saved documents land
/// in `export_dir`.
pub async fn run(console: AdminConsole, export_dir: PathBuf) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(console, export_dir);

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// How long the loop waits for input before redrawing, so background
/// loads show up without a key press.
const TICK: Duration = Duration::from_millis(100);

enum Step {
    Continue,
    Quit,
    Run(Action),
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.finish_loads().await;
        terminal.draw(|f| ui::draw(f, app))?;

        if !event::poll(TICK)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match handle_key(app, key.code) {
            Step::Continue => {}
            Step::Quit => return Ok(()),
            Step::Run(action) => {
                app.console.set_banner(action.progress());
                terminal.draw(|f| ui::draw(f, app))?;
                if run_action(app, action).await? {
                    return Ok(());
                }
            }
        }
    }
}

/// Awaits an action while still reading keys: Esc stops waiting for it and
/// q quits. Returns whether to quit.
async fn run_action(app: &mut App, action: Action) -> Result<bool> {
    let stopped = {
        let work = app.perform(action);
        tokio::pin!(work);
        loop {
            tokio::select! {
                () = &mut work => break None,
                () = tokio::time::sleep(TICK) => {
                    if let Some(code) = stop_key()? {
                        break Some(code);
                    }
                }
            }
        }
    };

    match stopped {
        None => Ok(false),
        Some(KeyCode::Char('q')) => Ok(true),
        Some(_) => {
            app.console
                .set_banner("Stopped waiting. Press r to see the current state.");
            Ok(false)
        }
    }
}

/// Drains pending input without blocking, looking for Esc or q.
fn stop_key() -> Result<Option<KeyCode>> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && matches!(key.code, KeyCode::Esc | KeyCode::Char('q'))
        {
            return Ok(Some(key.code));
        }
    }
    Ok(None)
}

fn handle_key(app: &mut App, code: KeyCode) -> Step {
    match app.input_mode {
        InputMode::Normal => match code {
            KeyCode::Char('q') => return Step::Quit,
            KeyCode::Char('?') => app.toggle_help(),
            KeyCode::Esc => app.console.clear_banner(),
            KeyCode::Char('j') | KeyCode::Down => app.next(),
            KeyCode::Char('k') | KeyCode::Up => app.previous(),
            KeyCode::Enter => app.toggle_expand(),
            KeyCode::Char(' ') => app.toggle_selection(),
            KeyCode::Char('a') => app.select_all_visible(),
            KeyCode::Char('c') => app.clear_selection(),
            KeyCode::Char('/') => app.start_search(),
            KeyCode::Char('s') => app.cycle_status_filter(),
            KeyCode::Char('o') => app.cycle_shop_filter(),
            KeyCode::Char('x') => app.clear_filters(),
            KeyCode::Char('A') => app.start_assign(),
            KeyCode::Char('d') => app.start_delete_selected(),
            KeyCode::Char('e') => return Step::Run(Action::Export(ExportFormat::SelectedPdf)),
            KeyCode::Char('S') => {
                return Step::Run(Action::Export(ExportFormat::sticker_sheet()));
            }
            KeyCode::Char('p') => return Step::Run(Action::BatchPdf),
            KeyCode::Char('g') => app.start_generate(),
            KeyCode::Char('D') => app.start_delete_batch(),
            KeyCode::Char('r') => return Step::Run(Action::Refresh),
            KeyCode::Char('i') if app.stats.is_some() => app.stats = None,
            KeyCode::Char('i') => return Step::Run(Action::Stats),
            _ => {}
        },
        InputMode::Searching => match code {
            KeyCode::Enter => app.confirm_search(),
            KeyCode::Esc => app.cancel_input(),
            KeyCode::Backspace => app.input_backspace(),
            KeyCode::Char(c) => app.input_char(c),
            _ => {}
        },
        InputMode::AssigningShop => match code {
            KeyCode::Enter => return Step::Run(Action::Assign),
            KeyCode::Esc => app.cancel_input(),
            KeyCode::Backspace => app.input_backspace(),
            KeyCode::Char(c) => app.input_char(c),
            _ => {}
        },
        InputMode::GeneratingCodes => match code {
            KeyCode::Enter => return Step::Run(Action::Generate),
            KeyCode::Esc => app.cancel_input(),
            KeyCode::Backspace => app.input_backspace(),
            KeyCode::Char(c) if c.is_ascii_digit() => app.input_char(c),
            _ => {}
        },
        InputMode::ConfirmDeleteSelected => match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => return Step::Run(Action::DeleteSelected),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_input(),
            _ => {}
        },
        InputMode::ConfirmDeleteBatch => match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => return Step::Run(Action::DeleteBatch),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => app.cancel_input(),
            _ => {}
        },
        InputMode::ShowingHelp => match code {
            KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => app.toggle_help(),
            _ => {}
        },
    }
    Step::Continue
}
