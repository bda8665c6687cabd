use std::io;
use std::time::Duration;

use chrono::FixedOffset;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::Terminal;

use crate::config::DetectorConfig;
use crate::generator::TickGenerator;
use crate::session::SimSession;
use crate::types::{format_clock, RobotState};

struct App {
    session: SimSession,
    zone: FixedOffset,
    zone_label: String,
    now_ms: i64,
    should_quit: bool,
    scroll_offset: usize,
}

impl App {
    fn new(config: &DetectorConfig, robot_rate: f64) -> Self {
        Self {
            session: SimSession::new(config, robot_rate),
            zone: config.display_zone(),
            zone_label: config.display_zone_label.clone(),
            now_ms: TickGenerator::now_ms(),
            should_quit: false,
            scroll_offset: 0,
        }
    }
}

pub async fn run(config: &DetectorConfig, robot_rate: f64, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, config, robot_rate, duration).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &DetectorConfig,
    robot_rate: f64,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut app = App::new(config, robot_rate);

    let run_duration = if duration == 0 {
        Duration::from_secs(3600)
    } else {
        Duration::from_secs(duration)
    };

    while !app.should_quit && app.session.started.elapsed() < run_duration {
        terminal.draw(|f| draw(f, &app))?;

        // Handle input
        if event::poll(Duration::from_millis(150))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                        KeyCode::Up => {
                            app.scroll_offset = app.scroll_offset.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            app.scroll_offset = app.scroll_offset.saturating_add(1);
                        }
                        _ => {}
                    }
                }
            }
        }

        app.now_ms = TickGenerator::now_ms();
        app.session.step(app.now_ms);
    }

    Ok(())
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // header
            Constraint::Min(10),    // detection feed
            Constraint::Length(10), // active robots + latency
            Constraint::Length(9),  // counts + engine
        ])
        .split(size);

    draw_header(f, app, chunks[0]);
    draw_detection_feed(f, app, chunks[1]);
    draw_robots_and_latency(f, app, chunks[2]);
    draw_counts_and_engine(f, app, chunks[3]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let stats = app.session.engine.stats();
    let header = vec![
        Span::styled(" robot-detect ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(format!("Robots: {}", stats.robots_created), Style::default().fg(Color::Yellow)),
        Span::raw(" | "),
        Span::styled(format!("Active: {}", stats.active_robots), Style::default().fg(Color::Magenta)),
        Span::raw(" | "),
        Span::styled(format!("Ticks: {}", app.session.total_ticks), Style::default().fg(Color::Green)),
        Span::raw(" | "),
        Span::raw(format!("Uptime: {}s", app.session.uptime_secs())),
        Span::raw(" | "),
        Span::styled("q=quit  Up/Down=scroll", Style::default().fg(Color::DarkGray)),
    ];
    let p = Paragraph::new(Line::from(header))
        .block(Block::default().borders(Borders::ALL).title(" Robot Watch "));
    f.render_widget(p, area);
}

fn draw_detection_feed(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let max_visible = (area.height as usize).saturating_sub(3);
    let alerts = app.session.alerts.recent_alerts();

    let rows: Vec<Row> = alerts
        .iter()
        .rev()
        .skip(app.scroll_offset)
        .take(max_visible)
        .map(|alert| {
            Row::new(vec![
                Cell::from(Span::styled(alert.tick_time.clone(), Style::default().fg(Color::Cyan))),
                Cell::from(Span::styled(
                    format!("{:<8}", alert.event.ticker),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                )),
                Cell::from(format!("{}s", alert.event.interval_secs)),
                Cell::from(format!("{} (±{})", alert.event.lot_size, alert.event.lot_tolerance)),
                Cell::from(format!("{}us", alert.latency_us)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Min(14),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec![format!("TIME {}", app.zone_label), "TICKER".into(), "INTERVAL".into(), "LOT".into(), "LATENCY".into()])
            .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::White)),
    )
    .block(Block::default().borders(Borders::ALL).title(format!(" Detections ({}) ", alerts.len())));

    f.render_widget(table, area);
}

fn draw_robots_and_latency(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    // Active robots, most recently seen first
    let mut robots: Vec<&RobotState> = app.session.engine.registry().iter().collect();
    robots.sort_by_key(|r| std::cmp::Reverse(r.last_tick_ms));
    let robot_rows: Vec<Row> = robots
        .iter()
        .take((chunks[0].height as usize).saturating_sub(3))
        .map(|r| {
            let silent_secs = (app.now_ms - r.last_tick_ms).max(0) / 1000;
            let color = if silent_secs > 60 { Color::DarkGray } else { Color::Green };
            Row::new(vec![
                Cell::from(Span::styled(format!("{:<8}", r.ticker), Style::default().fg(color))),
                Cell::from(format!("{}", r.lot_size)),
                Cell::from(format!("{}s", r.interval_secs)),
                Cell::from(format_clock(r.last_tick_ms, app.zone)),
                Cell::from(format!("{}s", silent_secs)),
            ])
        })
        .collect();

    let robot_table = Table::new(
        robot_rows,
        [
            Constraint::Length(9),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(10),
            Constraint::Min(6),
        ],
    )
    .header(
        Row::new(vec!["TICKER", "LOT", "INTERVAL", "LAST", "SILENT"])
            .style(Style::default().add_modifier(Modifier::BOLD).fg(Color::White)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Active Robots "));
    f.render_widget(robot_table, chunks[0]);

    // Latency panel
    let tick = app.session.latency.tick_stats();
    let cycle = app.session.latency.cycle_stats();
    let detect = app.session.latency.detection_stats();

    let latency_text = vec![
        Line::from(vec![
            Span::styled("  Tick:   ", Style::default().fg(Color::Green)),
            Span::raw(format!("p50={:<6} p99={:<6}", tick.p50_us, tick.p99_us)),
        ]),
        Line::from(vec![
            Span::styled("  Cycle:  ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("p50={:<6} p99={:<6}", cycle.p50_us, cycle.p99_us)),
        ]),
        Line::from(vec![
            Span::styled("  Detect: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("p50={:<6} p99={:<6}", detect.p50_us, detect.p99_us)),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Max tick: ", Style::default().fg(Color::DarkGray)),
            Span::raw(format!("{}us", tick.max_us)),
        ]),
    ];
    let latency_widget = Paragraph::new(latency_text)
        .block(Block::default().borders(Borders::ALL).title(" Latency (us) "));
    f.render_widget(latency_widget, chunks[1]);
}

fn draw_counts_and_engine(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    // Detections per ticker
    let counts = app.session.alerts.alert_counts();
    let mut tickers: Vec<_> = counts.iter().collect();
    tickers.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let count_rows: Vec<Row> = tickers
        .iter()
        .map(|(ticker, count)| {
            Row::new(vec![
                Cell::from(Span::styled(format!("{:<8}", ticker), Style::default().fg(Color::Yellow))),
                Cell::from(format!("{}", count)),
            ])
        })
        .collect();

    let count_table = Table::new(count_rows, [Constraint::Length(9), Constraint::Min(6)])
        .block(Block::default().borders(Borders::ALL).title(" Detections by Ticker "));
    f.render_widget(count_table, chunks[0]);

    // Engine counters
    let stats = app.session.engine.stats();
    let engine_rows: Vec<Row> = [
        ("ticks seen", stats.ticks_seen),
        ("below min lot", stats.ticks_dropped),
        ("evaluations", stats.evaluations),
        ("refreshed", stats.robots_refreshed),
        ("timed out", stats.robots_evicted),
        ("samples", app.session.engine.buffered_samples() as u64),
        ("injected", app.session.generator.robots_injected()),
    ]
    .iter()
    .map(|(name, value)| {
        Row::new(vec![
            Cell::from(Span::styled(format!("{:<14}", name), Style::default().fg(Color::DarkGray))),
            Cell::from(format!("{}", value)),
        ])
    })
    .collect();

    let engine_table = Table::new(engine_rows, [Constraint::Length(15), Constraint::Min(8)])
        .block(Block::default().borders(Borders::ALL).title(" Engine "));
    f.render_widget(engine_table, chunks[1]);
}
