//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::{Condition, Reg};
use crate::program::disasm::hex;
use super::app::{DebuggerApp, InputMode};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(60),
            Constraint::Percentage(40),
        ])
        .split(frame.area());

    // Left side: code, registers, output and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_output(frame, left_chunks[2], app);
    draw_status(frame, left_chunks[3], app);

    // Right side: memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_help(frame, right_chunks[1], app);
}

/// Draw disassembly around the PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let word = app.cpu.mem.peek(*addr);
            let text = format!("{}{}: {}  {}", prefix, hex(*addr), hex(word), instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw the register file, condition flags and machine state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = &app.cpu.regs;
    let reg_span = |reg: Reg| {
        let value = regs.get(reg);
        let style = if value == 0 {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::White)
        };
        Span::styled(format!("{}: {} {:>6}  ", reg, hex(value), value as i16), style)
    };

    let flags: Vec<Span> = Condition::ALL
        .iter()
        .rev()
        .map(|&cond| {
            if cond == regs.cond {
                Span::styled(cond.letter().to_string(), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else {
                Span::styled(cond.letter().to_ascii_lowercase().to_string(), Style::default().fg(Color::DarkGray))
            }
        })
        .collect();

    let mut cond_line = vec![
        Span::raw("PC: "),
        Span::styled(hex(regs.pc), Style::default().fg(Color::Yellow)),
        Span::raw("   COND: "),
    ];
    cond_line.extend(flags);

    let content = vec![
        Line::from(Reg::ALL[0..4].iter().map(|&r| reg_span(r)).collect::<Vec<_>>()),
        Line::from(Reg::ALL[4..8].iter().map(|&r| reg_span(r)).collect::<Vec<_>>()),
        Line::from(cond_line),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(format!("{}", app.cpu.cycles), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            Span::styled(format!("{:?}", app.cpu.state),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                }),
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw the program's console output, newest lines last.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = app.output.lines().collect();
    let start = lines.len().saturating_sub(visible);
    let text: Vec<Line> = lines[start..].iter().map(|l| Line::from(*l)).collect();

    let title = if app.mode == InputMode::Keyboard { " Console (typing) " } else { " Console " };
    let border = if app.waiting_for_input { Color::Yellow } else { Color::Blue };

    let paragraph = Paragraph::new(text)
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);

    let items: Vec<ListItem> = app.cpu.mem
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let is_pc = addr == app.cpu.regs.pc;

            let text = format!("{}: {} {:>6}", hex(addr), hex(value), value as i16);

            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let lines = match app.mode {
        InputMode::Command => vec![
            Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  x: Reset"),
            Line::from("F2: Type into program  ↑↓/PgUp/PgDn: Memory  g: Go to PC  q: Quit"),
        ],
        InputMode::Keyboard => vec![
            Line::from("Keys are sent to the program's keyboard."),
            Line::from("F2: Back to commands"),
        ],
    };

    let help = Paragraph::new(lines)
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true })
        .block(Block::default()
            .title(" Help ")
            .borders(Borders::ALL));

    frame.render_widget(help, area);
}
