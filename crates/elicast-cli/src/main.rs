use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use elicast_config::Config;
use elicast_engine::{
    Conflict, ConflictingOp, Operation, PosRange, Rerecording, SpliceOutcome, io, pos_to_line_ch,
    text::{lines_with_offsets, slice_chars},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use relative_path::RelativePathBuf;
use std::{env, fs::File, io::stdout, path::Path, path::PathBuf, process};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    From,
    To,
}

/// The author's current pick for one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    from_range: PosRange,
    to_range: PosRange,
    from: usize,
    to: usize,
    endpoint: Endpoint,
}

impl Candidate {
    fn new(conflict: &Conflict) -> Self {
        Self {
            from_range: conflict.from_pos_range,
            to_range: conflict.to_pos_range,
            from: conflict.from_pos_range.from,
            to: conflict.to_pos_range.from,
            endpoint: Endpoint::From,
        }
    }

    fn toggle_endpoint(&mut self) {
        self.endpoint = match self.endpoint {
            Endpoint::From => Endpoint::To,
            Endpoint::To => Endpoint::From,
        };
    }

    fn move_left(&mut self) {
        match self.endpoint {
            Endpoint::From => self.from = self.from.saturating_sub(1).max(self.from_range.from),
            Endpoint::To => self.to = self.to.saturating_sub(1).max(self.to_range.from),
        }
    }

    fn move_right(&mut self) {
        match self.endpoint {
            Endpoint::From => self.from = (self.from + 1).min(self.from_range.to),
            Endpoint::To => self.to = (self.to + 1).min(self.to_range.to),
        }
    }

    /// The operation that places the conflicting one at the picked positions.
    fn to_choice(&self, conflicting: &ConflictingOp, current_text: &str) -> Result<Operation> {
        let choice = match conflicting {
            ConflictingOp::Selection { ts } => Operation::selection(*ts, self.from, self.to),
            ConflictingOp::Text { ts, inserted_text } => {
                let to = self.to.max(self.from);
                let removed = slice_chars(current_text, self.from, to);
                Operation::text(*ts, self.from, to, inserted_text.as_str(), removed)?
            }
        };
        Ok(choice)
    }
}

enum Finished {
    Completed(Vec<Operation>),
    Cancelled,
}

struct App {
    rerecording: Rerecording,
    context_lines: usize,
    conflict: Option<Conflict>,
    current_text: String,
    candidate: Option<Candidate>,
    status: String,
}

impl App {
    fn new(rerecording: Rerecording, context_lines: usize) -> Self {
        Self {
            rerecording,
            context_lines,
            conflict: None,
            current_text: String::new(),
            candidate: None,
            status: String::new(),
        }
    }

    /// Retry the splice with every choice so far.
    fn attempt(&mut self) -> Result<Option<Vec<Operation>>> {
        match self.rerecording.attempt()? {
            SpliceOutcome::Success { ops } => Ok(Some(ops)),
            SpliceOutcome::Conflict(conflict) => {
                self.current_text = conflict.current_text();
                self.candidate = Some(Candidate::new(&conflict));
                self.conflict = Some(conflict);
                Ok(None)
            }
        }
    }

    fn accept(&mut self) -> Result<Option<Vec<Operation>>> {
        let (Some(conflict), Some(candidate)) = (&self.conflict, &self.candidate) else {
            return self.attempt();
        };
        let choice = candidate.to_choice(&conflict.conflicting, &self.current_text)?;
        self.accept_choice(choice)
    }

    fn accept_choice(&mut self, choice: Operation) -> Result<Option<Vec<Operation>>> {
        self.rerecording.resolve(choice);

        match self.attempt() {
            Ok(outcome) => {
                self.status = format!("{} choices so far", self.rerecording.choices().len());
                Ok(outcome)
            }
            Err(e) => {
                // A choice the engine rejects must not poison later retries
                self.rerecording.undo_choice();
                Err(e)
            }
        }
    }

    /// Take back the last choice. Returns false when there was none left.
    fn undo(&mut self) -> Result<bool> {
        if self.rerecording.undo_choice().is_none() {
            return Ok(false);
        }
        self.status = "Undid the last choice".to_string();
        self.attempt()?;
        Ok(true)
    }

    fn candidate_mut(&mut self) -> Option<&mut Candidate> {
        self.candidate.as_mut()
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let (sessions_dir, request) = match args.as_slice() {
        [_] => (None, None),
        [_, dir] if Path::new(dir).is_dir() => (Some(PathBuf::from(dir)), None),
        [_, request] => (None, Some(request.clone())),
        [_, dir, request] => (Some(PathBuf::from(dir)), Some(request.clone())),
        _ => {
            eprintln!("Usage: {} [sessions-dir] [request.json]", args[0]);
            process::exit(1);
        }
    };

    let config = match Config::resolve(sessions_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Usage: {} [sessions-dir] [request.json]", args[0]);
            process::exit(1);
        }
    };

    if let Err(e) = io::validate_sessions_dir(&config.sessions_path) {
        eprintln!(
            "Error: Sessions path '{}' is invalid: {e}",
            config.sessions_path.display()
        );
        process::exit(1);
    }

    init_logging(&config.sessions_path)?;
    log::info!("elicast-cli starting with sessions at {}", config.sessions_path.display());

    let Some(request) = request else {
        let sessions = io::scan_sessions(&config.sessions_path)?;
        if sessions.is_empty() {
            println!("No session files in {}", config.sessions_path.display());
        }
        for session in sessions {
            println!("{session}");
        }
        return Ok(());
    };

    let request_path = RelativePathBuf::from(request);
    let rerecording = io::read_request(&request_path, &config.sessions_path)?
        .into_rerecording()
        .context("failed to finish the past recording")?;

    let mut app = App::new(rerecording, config.context_lines);
    let finished = match app.attempt()? {
        Some(ops) => Finished::Completed(ops),
        None => run_in_terminal(&mut app)?,
    };

    match finished {
        Finished::Completed(ops) => {
            let ops = app.rerecording.complete(ops);
            let output = io::resolved_path(&request_path);
            io::write_log(&output, &config.sessions_path, &ops)?;
            println!("Wrote {} operations to {output}", ops.len());
        }
        Finished::Cancelled => {
            let text = app.rerecording.cancel();
            println!("Re-recording cancelled. Document at the end of the recording:");
            println!("{text}");
        }
    }

    Ok(())
}

/// Log to a file in the sessions directory so the TUI stays readable.
fn init_logging(sessions_path: &Path) -> Result<()> {
    let log_file = File::create(sessions_path.join("elicast-cli.log"))?;
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

fn run_in_terminal(app: &mut App) -> Result<Finished> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<Finished>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(Finished::Cancelled),
                KeyCode::Left => {
                    if let Some(candidate) = app.candidate_mut() {
                        candidate.move_left();
                    }
                }
                KeyCode::Right => {
                    if let Some(candidate) = app.candidate_mut() {
                        candidate.move_right();
                    }
                }
                KeyCode::Tab => {
                    if let Some(candidate) = app.candidate_mut() {
                        candidate.toggle_endpoint();
                    }
                }
                KeyCode::Enter => match app.accept() {
                    Ok(Some(ops)) => return Ok(Finished::Completed(ops)),
                    Ok(None) => {}
                    Err(e) => app.status = format!("Error: {e}"),
                },
                KeyCode::Char('u') => match app.undo() {
                    Ok(true) => {}
                    Ok(false) => return Ok(Finished::Cancelled),
                    Err(e) => app.status = format!("Error: {e}"),
                },
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(5), Constraint::Min(0), Constraint::Length(2)].as_ref())
        .split(f.area());

    let (Some(conflict), Some(candidate)) = (&app.conflict, &app.candidate) else {
        return;
    };

    let from = pos_to_line_ch(&app.current_text, candidate.from);
    let to = pos_to_line_ch(&app.current_text, candidate.to);
    let what = match &conflict.conflicting {
        ConflictingOp::Selection { ts } => format!("selection at {ts}ms"),
        ConflictingOp::Text { ts, inserted_text } => format!("edit at {ts}ms inserting {inserted_text:?}"),
    };
    let active = match candidate.endpoint {
        Endpoint::From => "from",
        Endpoint::To => "to",
    };
    let info = vec![
        Line::from(format!("Where does the {what} belong now?")),
        Line::from(format!(
            "from {}:{} (range {}..{})  to {}:{} (range {}..{})",
            from.line + 1,
            from.ch + 1,
            candidate.from_range.from,
            candidate.from_range.to,
            to.line + 1,
            to.ch + 1,
            candidate.to_range.from,
            candidate.to_range.to,
        )),
        Line::from(format!("moving: {active}   {}", app.status)),
    ];
    let header = Paragraph::new(info).block(Block::default().borders(Borders::ALL).title("Conflict"));
    f.render_widget(header, chunks[0]);

    let first = from.line.saturating_sub(app.context_lines);
    let last = to.line.max(from.line) + app.context_lines;
    let document = Paragraph::new(document_lines(&app.current_text, candidate, first, last))
        .block(Block::default().borders(Borders::ALL).title("Document"));
    f.render_widget(document, chunks[1]);

    let help = Paragraph::new(Line::from(vec![
        Span::raw("←/→: Move | "),
        Span::raw("Tab: Switch endpoint | "),
        Span::raw("Enter: Accept | "),
        Span::raw("u: Undo choice | "),
        Span::raw("Esc/q: Cancel"),
    ]));
    f.render_widget(help, chunks[2]);
}

/// Lines `first..=last` of the document with both candidate ranges marked.
fn document_lines(text: &str, candidate: &Candidate, first: usize, last: usize) -> Vec<Line<'static>> {
    let cursor = Style::default().add_modifier(Modifier::REVERSED);
    let in_range = |range: &PosRange, pos: usize| range.from <= pos && pos < range.to;

    lines_with_offsets(text)
        .into_iter()
        .enumerate()
        .filter(|(index, _)| (first..=last).contains(index))
        .map(|(_, (start, line))| {
            let mut spans: Vec<Span<'static>> = line
                .chars()
                .enumerate()
                .map(|(offset, ch)| {
                    let at = start + offset;
                    let style = if at == candidate.from || at == candidate.to {
                        cursor
                    } else if in_range(&candidate.from_range, at) {
                        Style::default().bg(Color::Yellow).fg(Color::Black)
                    } else if in_range(&candidate.to_range, at) {
                        Style::default().bg(Color::Cyan).fg(Color::Black)
                    } else {
                        Style::default()
                    };
                    Span::styled(ch.to_string(), style)
                })
                .collect();

            let end = start + line.chars().count();
            if end == candidate.from || end == candidate.to {
                spans.push(Span::styled(" ", cursor));
            }
            Line::from(spans)
        })
        .collect()
}
