use std::{
    collections::{HashSet, VecDeque},
    io::Stdout,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Receiver,
        Arc,
    },
    thread,
    time::Duration,
};

use chrono::Datelike;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::{
    bridge::{BridgeEvent, EventBridge},
    config::JournalConfig,
    entries::{EditorLauncher, EntryRepository, TagSearch},
    error::{classify_error_code, JournalError, Result},
    logging::init_logging,
    types::{ChangeEvent, EntryDate},
    volume::{GocryptfsDriver, VolumeController, VolumeOptions},
};

type JournalTerminal = Terminal<CrosstermBackend<Stdout>>;

const INPUT_POLL_MILLIS: u64 = 200;
const MAX_LOG_LINES: usize = 500;
const LOGS_HEIGHT_SMALL: u16 = 6;
const LOGS_HEIGHT_LARGE: u16 = 14;
const CALENDAR_WIDTH: u16 = 30;
const CALENDAR_HEIGHT: u16 = 10;
const PREVIEW_PAGE_STEP: u16 = 10;
const PROMPT_WIDTH: u16 = 44;
const MIN_UNLOCKED_WIDTH: u16 = 64;
const MIN_UNLOCKED_HEIGHT: u16 = 26;
const WEEKDAY_HEADER: &str = "Mo Tu We Th Fr Sa Su";

/// Opens the journal UI. Unmounts before the terminal is restored.
pub(crate) fn run_journal_ui(config: &JournalConfig) -> Result<i32> {
    if !atty::is(atty::Stream::Stdin) || !atty::is(atty::Stream::Stdout) {
        return Err(JournalError::InvalidInput(
            "`journal` requires an interactive terminal".to_owned(),
        ));
    }
    let Some(cipher_dir) = config.cipher_dir.clone() else {
        return Err(JournalError::InvalidInput(
            "no cipher directory given; pass CIPHER_DIR or set JOURNAL_ENC_DIR".to_owned(),
        ));
    };

    let driver = GocryptfsDriver::with_binary(&config.volume.gocryptfs);
    driver.check_version()?;

    let (bridge, events) = EventBridge::channel();
    let _log_guard = init_logging(&config.logging, Some(bridge.clone()))?;

    let controller = VolumeController::new(
        driver,
        VolumeOptions::new(cipher_dir, &config.mount_dir)
            .with_idle(config.idle)
            .with_grace_window(config.volume.grace_window)
            .with_unmount_timeout(config.volume.unmount_timeout),
    );
    let unmount_bridge = bridge.clone();
    controller.on_unmount(move || {
        unmount_bridge.post(BridgeEvent::Unmounted);
    });
    let change_bridge = bridge.clone();
    controller.on_fs_event(move |event| {
        change_bridge.post(BridgeEvent::FsChange(event));
    });

    let repository = EntryRepository::new(
        controller.clone(),
        TagSearch::with_binary(&config.search.rg),
        EditorLauncher::from_env(&config.editor),
    );

    let stop = Arc::new(AtomicBool::new(false));
    bridge.spawn_ticker(config.search.tag_refresh, Arc::clone(&stop), || {
        BridgeEvent::RefreshTags
    });
    spawn_input_reader(bridge.clone(), Arc::clone(&stop))?;

    let mut terminal = init_terminal()?;
    let mut app = JournalApp::new(repository, bridge);
    let run_result = run_event_loop(&mut terminal, &mut app, &events);
    stop.store(true, Ordering::Release);
    let unmount_result = controller.unmount();
    let restore_result = restore_terminal(&mut terminal);
    restore_result?;
    unmount_result?;
    run_result.map(|()| 0)
}

fn spawn_input_reader(bridge: EventBridge, stop: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("journal-input".to_owned())
        .spawn(move || {
            while !stop.load(Ordering::Acquire) {
                match event::poll(Duration::from_millis(INPUT_POLL_MILLIS)) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(error) => {
                        tracing::warn!(%error, "terminal input unavailable");
                        break;
                    }
                }
                match event::read() {
                    Ok(input) => {
                        if !bridge.post(BridgeEvent::Input(input)) {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "terminal input unavailable");
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

fn init_terminal() -> Result<JournalTerminal> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut JournalTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_event_loop(
    terminal: &mut JournalTerminal,
    app: &mut JournalApp,
    events: &Receiver<BridgeEvent>,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| app.render(frame))?;
        if let Some(password) = app.pending_unlock.take() {
            app.unlock(password);
            continue;
        }

        let Ok(event) = events.recv() else {
            break;
        };
        app.apply(event);
        while !app.should_quit {
            match events.try_recv() {
                Ok(event) => app.apply(event),
                Err(_) => break,
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusPane {
    Calendar,
    Tags,
    Preview,
    Logs,
}

impl FocusPane {
    fn next(self) -> Self {
        match self {
            Self::Calendar => Self::Tags,
            Self::Tags => Self::Preview,
            Self::Preview => Self::Logs,
            Self::Logs => Self::Calendar,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::Calendar => Self::Logs,
            Self::Tags => Self::Calendar,
            Self::Preview => Self::Tags,
            Self::Logs => Self::Preview,
        }
    }

    fn help(self) -> &'static str {
        match self {
            Self::Calendar => {
                "Move: arrows/hjkl | Edit: Enter | Delete: d | Today: t | Go to: g | Month: n/p | Pane: Tab | Quit: q"
            }
            Self::Tags => "Select: Up/Down | Open: Enter | Back: Esc | Pane: Tab | Quit: q",
            Self::Preview => "Scroll: Up/Down, PgUp/PgDn | Pane: Tab | Quit: q",
            Self::Logs => "Scroll: Up/Down | Clear: c | Pane: Tab | Quit: q",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    ConfirmDelete(EntryDate),
    GoTo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagMatches {
    tag: String,
    dates: Vec<EntryDate>,
}

struct JournalApp {
    repository: EntryRepository<VolumeController>,
    bridge: EventBridge,
    password: Zeroizing<String>,
    pending_unlock: Option<SecretString>,
    locked_status: Option<String>,
    focus: FocusPane,
    modal: Option<Modal>,
    cursor: EntryDate,
    month_entries: HashSet<u32>,
    tags: Vec<String>,
    tag_state: ListState,
    matches: Option<TagMatches>,
    match_state: ListState,
    preview_lines: Vec<String>,
    preview_scroll: u16,
    logs: VecDeque<String>,
    logs_scroll_back: u16,
    should_quit: bool,
}

impl JournalApp {
    fn new(repository: EntryRepository<VolumeController>, bridge: EventBridge) -> Self {
        let mut app = Self {
            repository,
            bridge,
            password: Zeroizing::new(String::new()),
            pending_unlock: None,
            locked_status: None,
            focus: FocusPane::Calendar,
            modal: None,
            cursor: EntryDate::today(),
            month_entries: HashSet::new(),
            tags: Vec::new(),
            tag_state: ListState::default(),
            matches: None,
            match_state: ListState::default(),
            preview_lines: Vec::new(),
            preview_scroll: 0,
            logs: VecDeque::new(),
            logs_scroll_back: 0,
            should_quit: false,
        };
        app.refresh_preview();
        app
    }

    fn is_unlocked(&self) -> bool {
        self.repository.volume().is_mounted()
    }

    fn apply(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Wake => self.bridge.acknowledge_wake(),
            BridgeEvent::Unmounted => self.lock(),
            BridgeEvent::FsChange(change) => self.on_change(&change),
            BridgeEvent::RefreshTags => {
                if self.is_unlocked() {
                    self.refresh_tags();
                }
            }
            BridgeEvent::Log(line) => self.push_log(line),
            BridgeEvent::Input(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                self.on_key(key);
            }
            BridgeEvent::Input(_) => {}
        }
    }

    fn unlock(&mut self, password: SecretString) {
        match self.repository.volume().mount(&password) {
            Ok(()) => {
                self.locked_status = None;
                tracing::info!("unlocked journal");
                self.refresh_all();
            }
            Err(error) => {
                tracing::warn!(%error, "failed to unlock journal");
                self.locked_status = Some(format!(
                    "error[{}]: {error}",
                    classify_error_code(&error)
                ));
            }
        }
    }

    fn lock(&mut self) {
        // A marker from an earlier session can arrive after a remount.
        if self.is_unlocked() {
            tracing::debug!("ignoring unmount notice for a previous session");
            return;
        }
        self.modal = None;
        self.matches = None;
        self.tags.clear();
        self.month_entries.clear();
        self.locked_status = Some("journal was unmounted".to_owned());
        self.refresh_preview();
    }

    fn on_change(&mut self, change: &ChangeEvent) {
        if !self.is_unlocked() {
            return;
        }
        let Some(date) = self.repository.entry_at_path(&change.path) else {
            return;
        };
        if date.year() == self.cursor.year() && date.month() == self.cursor.month() {
            self.refresh_month();
        }
        if Some(date) == self.previewed_date() {
            self.refresh_preview();
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('q')) {
            self.should_quit = true;
            return;
        }
        if !self.is_unlocked() {
            self.on_locked_key(key);
            return;
        }
        if let Some(modal) = self.modal.take() {
            self.on_modal_key(modal, key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                return;
            }
            KeyCode::Tab => {
                self.focus = self.focus.next();
                self.refresh_preview();
                return;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.previous();
                self.refresh_preview();
                return;
            }
            KeyCode::PageUp => {
                self.preview_scroll = self.preview_scroll.saturating_sub(PREVIEW_PAGE_STEP);
                return;
            }
            KeyCode::PageDown => {
                self.preview_scroll = self.preview_scroll.saturating_add(PREVIEW_PAGE_STEP);
                return;
            }
            KeyCode::Char('u') if ctrl => {
                self.preview_scroll = self.preview_scroll.saturating_sub(PREVIEW_PAGE_STEP);
                return;
            }
            KeyCode::Char('d') if ctrl => {
                self.preview_scroll = self.preview_scroll.saturating_add(PREVIEW_PAGE_STEP);
                return;
            }
            _ => {}
        }

        match self.focus {
            FocusPane::Calendar => self.on_calendar_key(key),
            FocusPane::Tags => self.on_tags_key(key),
            FocusPane::Preview => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    self.preview_scroll = self.preview_scroll.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.preview_scroll = self.preview_scroll.saturating_add(1);
                }
                _ => {}
            },
            FocusPane::Logs => match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    self.logs_scroll_back = self.logs_scroll_back.saturating_add(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.logs_scroll_back = self.logs_scroll_back.saturating_sub(1);
                }
                KeyCode::Char('c') => {
                    self.logs.clear();
                    self.logs_scroll_back = 0;
                }
                _ => {}
            },
        }
    }

    fn on_locked_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                if self.password.is_empty() {
                    return;
                }
                let password = std::mem::take(&mut *self.password);
                self.pending_unlock = Some(SecretString::new(password));
                self.locked_status = Some("unlocking...".to_owned());
            }
            KeyCode::Esc => self.password.clear(),
            KeyCode::Backspace => {
                self.password.pop();
            }
            KeyCode::Char(character) => self.password.push(character),
            _ => {}
        }
    }

    fn on_modal_key(&mut self, modal: Modal, key: KeyEvent) {
        match modal {
            Modal::ConfirmDelete(date) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    match self.repository.delete_entry(date) {
                        Ok(()) => tracing::info!(
                            path = %self.repository.entry_path(date).display(),
                            "deleted entry"
                        ),
                        Err(error) => tracing::warn!(%error, "failed to delete entry"),
                    }
                    self.refresh_month();
                    self.refresh_preview();
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {}
                _ => self.modal = Some(Modal::ConfirmDelete(date)),
            },
            Modal::GoTo(mut input) => match key.code {
                KeyCode::Esc => {}
                KeyCode::Enter => match input.trim().parse::<EntryDate>() {
                    Ok(date) => self.move_cursor(date),
                    Err(error) => tracing::warn!(%error, "cannot go to date"),
                },
                KeyCode::Backspace => {
                    input.pop();
                    self.modal = Some(Modal::GoTo(input));
                }
                KeyCode::Char(character) => {
                    input.push(character);
                    self.modal = Some(Modal::GoTo(input));
                }
                _ => self.modal = Some(Modal::GoTo(input)),
            },
        }
    }

    fn on_calendar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => self.move_cursor(self.cursor.add_days(-1)),
            KeyCode::Right | KeyCode::Char('l') => self.move_cursor(self.cursor.add_days(1)),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(self.cursor.add_days(-7)),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(self.cursor.add_days(7)),
            KeyCode::Char('n') => self.move_cursor(self.cursor.add_months(1)),
            KeyCode::Char('p') => self.move_cursor(self.cursor.add_months(-1)),
            KeyCode::Char('t') => self.move_cursor(EntryDate::today()),
            KeyCode::Char('g') => self.modal = Some(Modal::GoTo(String::new())),
            KeyCode::Enter => self.edit(self.cursor),
            KeyCode::Char('d') => match self.repository.has_entry(self.cursor) {
                Ok(true) => self.modal = Some(Modal::ConfirmDelete(self.cursor)),
                Ok(false) => {}
                Err(error) => tracing::warn!(%error, "failed to read entry"),
            },
            _ => {}
        }
    }

    fn on_tags_key(&mut self, key: KeyEvent) {
        if let Some(matches) = &self.matches {
            let len = matches.dates.len();
            match key.code {
                KeyCode::Esc => {
                    self.matches = None;
                    self.refresh_preview();
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    select_previous(&mut self.match_state, len);
                    self.refresh_preview();
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    select_next(&mut self.match_state, len);
                    self.refresh_preview();
                }
                KeyCode::Enter => {
                    let selected = self
                        .match_state
                        .selected()
                        .and_then(|index| matches.dates.get(index))
                        .copied();
                    if let Some(date) = selected {
                        self.matches = None;
                        self.edit(date);
                        self.refresh_preview();
                    }
                }
                _ => {}
            }
            return;
        }

        let len = self.tags.len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => select_previous(&mut self.tag_state, len),
            KeyCode::Down | KeyCode::Char('j') => select_next(&mut self.tag_state, len),
            KeyCode::Enter => {
                let Some(tag) = self
                    .tag_state
                    .selected()
                    .and_then(|index| self.tags.get(index))
                    .cloned()
                else {
                    return;
                };
                match self.repository.search_tag(&tag) {
                    Ok(dates) => {
                        self.match_state = ListState::default();
                        if !dates.is_empty() {
                            self.match_state.select(Some(0));
                        }
                        self.matches = Some(TagMatches { tag, dates });
                        self.refresh_preview();
                    }
                    Err(error) => tracing::warn!(%error, %tag, "tag search failed"),
                }
            }
            _ => {}
        }
    }

    fn edit(&mut self, date: EntryDate) {
        if let Err(error) = self.repository.edit_entry(date) {
            tracing::warn!(%error, "failed to open entry");
        }
        self.refresh_month();
        self.refresh_preview();
    }

    fn move_cursor(&mut self, date: EntryDate) {
        let month_changed = date.year() != self.cursor.year() || date.month() != self.cursor.month();
        self.cursor = date;
        if month_changed {
            self.refresh_month();
        }
        self.refresh_preview();
    }

    fn refresh_all(&mut self) {
        self.refresh_tags();
        self.refresh_month();
        self.refresh_preview();
    }

    fn refresh_tags(&mut self) {
        match self.repository.tags() {
            Ok(tags) => {
                let previous = self
                    .tag_state
                    .selected()
                    .and_then(|index| self.tags.get(index))
                    .cloned();
                let mut tags = tags.into_iter().collect::<Vec<_>>();
                tags.sort();
                let selected = previous
                    .and_then(|tag| tags.iter().position(|candidate| *candidate == tag))
                    .or(if tags.is_empty() { None } else { Some(0) });
                self.tags = tags;
                self.tag_state.select(selected);
            }
            Err(error) => tracing::warn!(%error, "failed to refresh tags"),
        }
    }

    fn refresh_month(&mut self) {
        self.month_entries.clear();
        if !self.is_unlocked() {
            return;
        }
        let first = self.cursor.first_of_month();
        for offset in 0..days_in_month(first) {
            let date = first.add_days(i64::from(offset));
            match self.repository.has_entry(date) {
                Ok(true) => {
                    self.month_entries.insert(date.day());
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%error, "failed to read entry");
                    return;
                }
            }
        }
    }

    fn previewed_date(&self) -> Option<EntryDate> {
        if self.focus == FocusPane::Tags {
            if let Some(matches) = &self.matches {
                return self
                    .match_state
                    .selected()
                    .and_then(|index| matches.dates.get(index))
                    .copied();
            }
        }
        Some(self.cursor)
    }

    fn refresh_preview(&mut self) {
        self.preview_scroll = 0;
        if !self.is_unlocked() {
            self.preview_lines = vec!["[Journal is locked]".to_owned()];
            return;
        }
        let Some(date) = self.previewed_date() else {
            self.preview_lines = Vec::new();
            return;
        };
        self.preview_lines = match self.repository.get_entry(date) {
            Ok(Some(content)) => content.lines().map(str::to_owned).collect(),
            Ok(None) => vec!["[No entry]".to_owned()],
            Err(error) => {
                tracing::warn!(%error, "failed to read entry");
                vec![format!("[{error}]")]
            }
        };
    }

    fn push_log(&mut self, line: String) {
        self.logs.push_back(line);
        while self.logs.len() > MAX_LOG_LINES {
            self.logs.pop_front();
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();
        if !self.is_unlocked() {
            self.render_locked(frame, area);
            return;
        }
        if area.width < MIN_UNLOCKED_WIDTH || area.height < MIN_UNLOCKED_HEIGHT {
            let message = format!(
                "Terminal is too small.\nCurrent size: {} x {}\nMust be at least: {MIN_UNLOCKED_WIDTH} x {MIN_UNLOCKED_HEIGHT}",
                area.width, area.height
            );
            frame.render_widget(Paragraph::new(message), area);
            return;
        }

        let logs_height = if self.focus == FocusPane::Logs {
            LOGS_HEIGHT_LARGE
        } else {
            LOGS_HEIGHT_SMALL
        };
        let root_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(logs_height),
                Constraint::Length(1),
            ])
            .split(area);
        let top_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(CALENDAR_WIDTH), Constraint::Min(1)])
            .split(root_chunks[0]);
        let left_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(CALENDAR_HEIGHT), Constraint::Min(1)])
            .split(top_chunks[0]);

        self.render_calendar(frame, left_chunks[0]);
        self.render_tags(frame, left_chunks[1]);
        self.render_preview(frame, top_chunks[1]);
        self.render_logs(frame, root_chunks[1]);

        let help = Paragraph::new(self.focus.help())
            .style(Style::default().add_modifier(Modifier::DIM));
        frame.render_widget(help, root_chunks[2]);

        match &self.modal {
            Some(Modal::ConfirmDelete(date)) => render_prompt(
                frame,
                "Delete entry? (y/n)",
                format!("Delete the entry for {}?", date.label()),
            ),
            Some(Modal::GoTo(input)) => {
                render_prompt(frame, "Go to (YYYY/MM/DD)", format!("{input}_"))
            }
            None => {}
        }
    }

    fn render_locked(&self, frame: &mut Frame, area: Rect) {
        let prompt = centered_rect(area, PROMPT_WIDTH.min(area.width), 3);
        let masked = "*".repeat(self.password.chars().count());
        frame.render_widget(
            Paragraph::new(masked).block(Block::default().borders(Borders::ALL).title("Password")),
            prompt,
        );
        if let Some(status) = &self.locked_status {
            let below = Rect {
                y: prompt.y.saturating_add(prompt.height),
                height: 1.min(area.height.saturating_sub(prompt.y + prompt.height)),
                ..prompt
            };
            frame.render_widget(Paragraph::new(status.as_str()), below);
        }
    }

    fn render_calendar(&self, frame: &mut Frame, area: Rect) {
        let first = self.cursor.first_of_month();
        let today = EntryDate::today();
        let focused = self.focus == FocusPane::Calendar;
        let lead = first.as_naive().weekday().num_days_from_monday() as usize;

        let mut lines = vec![Line::from(WEEKDAY_HEADER)];
        let mut spans = vec![Span::raw("   ".repeat(lead))];
        for offset in 0..days_in_month(first) {
            let date = first.add_days(i64::from(offset));
            let mut style = Style::default();
            if self.month_entries.contains(&date.day()) {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            if date == today {
                style = style.add_modifier(Modifier::BOLD);
            }
            if date == self.cursor {
                style = style.add_modifier(if focused {
                    Modifier::REVERSED
                } else {
                    Modifier::BOLD | Modifier::ITALIC
                });
            }
            spans.push(Span::styled(format!("{:>2}", date.day()), style));
            spans.push(Span::raw(" "));
            if (lead + offset as usize + 1) % 7 == 0 {
                lines.push(Line::from(std::mem::take(&mut spans)));
            }
        }
        if !spans.is_empty() {
            lines.push(Line::from(spans));
        }

        let title = pane_title(
            &format!("[1] {}", self.cursor.as_naive().format("%B %Y")),
            focused,
        );
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
            area,
        );
    }

    fn render_tags(&mut self, frame: &mut Frame, area: Rect) {
        let focused = self.focus == FocusPane::Tags;
        let (title, items, state) = match &self.matches {
            Some(matches) => (
                format!("[2] Tags > {}", matches.tag),
                matches
                    .dates
                    .iter()
                    .map(|date| ListItem::new(date.label()))
                    .collect::<Vec<_>>(),
                &mut self.match_state,
            ),
            None => (
                "[2] Tags".to_owned(),
                self.tags
                    .iter()
                    .map(|tag| ListItem::new(tag.as_str()))
                    .collect::<Vec<_>>(),
                &mut self.tag_state,
            ),
        };
        let mut list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(pane_title(&title, focused)));
        if focused {
            list = list
                .highlight_symbol(">> ")
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
        }
        frame.render_stateful_widget(list, area, state);
    }

    fn render_preview(&self, frame: &mut Frame, area: Rect) {
        let title = match self.previewed_date() {
            Some(date) => format!("[3] Preview {}", date.label()),
            None => "[3] Preview".to_owned(),
        };
        let preview = Paragraph::new(self.preview_lines.join("\n"))
            .wrap(Wrap { trim: false })
            .scroll((self.preview_scroll, 0))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(pane_title(&title, self.focus == FocusPane::Preview)),
            );
        frame.render_widget(preview, area);
    }

    fn render_logs(&self, frame: &mut Frame, area: Rect) {
        let viewport = usize::from(area.height.saturating_sub(2));
        let end = self
            .logs
            .len()
            .saturating_sub(usize::from(self.logs_scroll_back));
        let start = end.saturating_sub(viewport);
        let text = self
            .logs
            .iter()
            .skip(start)
            .take(end - start)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        frame.render_widget(
            Paragraph::new(text).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(pane_title("[4] Log", self.focus == FocusPane::Logs)),
            ),
            area,
        );
    }
}

fn render_prompt(frame: &mut Frame, title: &str, body: String) {
    let area = frame.area();
    let popup = centered_rect(area, PROMPT_WIDTH.min(area.width), 3);
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(body).block(Block::default().borders(Borders::ALL).title(title.to_owned())),
        popup,
    );
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

fn pane_title(title: &str, focused: bool) -> Line<'static> {
    if focused {
        Line::from(vec![
            Span::styled("[*] ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(title.to_owned()),
        ])
    } else {
        Line::from(title.to_owned())
    }
}

fn select_next(state: &mut ListState, len: usize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let next = state.selected().map_or(0, |index| (index + 1).min(len - 1));
    state.select(Some(next));
}

fn select_previous(state: &mut ListState, len: usize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let previous = state.selected().map_or(0, |index| index.saturating_sub(1));
    state.select(Some(previous));
}

fn days_in_month(first: EntryDate) -> u32 {
    let next = first.add_months(1);
    let days = next.as_naive().signed_duration_since(first.as_naive()).num_days();
    u32::try_from(days).unwrap_or(31)
}

#[cfg(test)]
mod unit_tests {
    use std::time::Duration;

    use ratatui::widgets::ListState;
    use secrecy::SecretString;

    use super::{days_in_month, select_next, select_previous, FocusPane, JournalApp};
    use crate::{
        bridge::{BridgeEvent, EventBridge},
        entries::{EditorLauncher, EditorMode, EntryRepository, TagSearch},
        types::EntryDate,
        volume::{GocryptfsDriver, VolumeController, VolumeOptions},
    };

    #[test]
    fn month_lengths_cover_leap_years() {
        assert_eq!(days_in_month(EntryDate::new(2024, 2, 1).unwrap()), 29);
        assert_eq!(days_in_month(EntryDate::new(2023, 2, 1).unwrap()), 28);
        assert_eq!(days_in_month(EntryDate::new(2024, 12, 1).unwrap()), 31);
        assert_eq!(days_in_month(EntryDate::new(2024, 4, 1).unwrap()), 30);
    }

    #[test]
    fn list_selection_clamps_to_bounds() {
        let mut state = ListState::default();
        select_next(&mut state, 2);
        assert_eq!(state.selected(), Some(0));
        select_next(&mut state, 2);
        select_next(&mut state, 2);
        assert_eq!(state.selected(), Some(1));
        select_previous(&mut state, 2);
        select_previous(&mut state, 2);
        assert_eq!(state.selected(), Some(0));
        select_next(&mut state, 0);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn focus_cycle_visits_every_pane() {
        let mut focus = FocusPane::Calendar;
        for _ in 0..4 {
            assert_eq!(focus.next().previous(), focus);
            focus = focus.next();
        }
        assert_eq!(focus, FocusPane::Calendar);
    }

    #[cfg(unix)]
    fn mounted_app(temp: &tempfile::TempDir) -> JournalApp {
        use std::{fs, os::unix::fs::PermissionsExt};

        let binary = temp.path().join("gocryptfs");
        fs::write(&binary, "#!/bin/sh\nread password\nexec sleep 30\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        let cipher_dir = temp.path().join("cipher");
        fs::create_dir_all(&cipher_dir).unwrap();

        let controller = VolumeController::new(
            GocryptfsDriver::with_binary(binary.to_string_lossy().to_string()),
            VolumeOptions::new(&cipher_dir, temp.path().join("mnt"))
                .with_grace_window(Duration::from_millis(200)),
        );
        controller
            .mount(&SecretString::new("secret".to_owned()))
            .unwrap();
        let repository = EntryRepository::new(
            controller,
            TagSearch::with_binary("/nonexistent/rg"),
            EditorLauncher::new("tmux", None, false, EditorMode::Window),
        );
        let (bridge, _receiver) = EventBridge::channel();
        JournalApp::new(repository, bridge)
    }

    #[cfg(unix)]
    #[test]
    fn stale_unmount_notice_keeps_remounted_journal_unlocked() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = mounted_app(&temp);
        app.tags = vec!["@work".to_owned()];

        app.apply(BridgeEvent::Unmounted);
        assert_eq!(app.tags, vec!["@work".to_owned()]);
        assert!(app.locked_status.is_none());

        app.repository.volume().unmount().unwrap();
        app.apply(BridgeEvent::Unmounted);
        assert!(app.tags.is_empty());
        assert_eq!(app.locked_status.as_deref(), Some("journal was unmounted"));
    }
}
