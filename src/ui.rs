use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Gauge, Paragraph, Row, Table, TableState, Wrap},
};

use crate::model::{ColumnView, UIData};
use crate::notify::NotifyKind;
use crate::sort::SortDirection;

pub const CMDLINE_HEIGH: u16 = 1;
pub const FOOTER_HEIGHT: u16 = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const SELECTION_MARKER_WIDTH: usize = 2;

const SELECTION_MARKER: &str = "●";

#[derive(Debug, Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, uidata: &UIData, frame: &mut Frame) {
        let [title_area, table_area, footer_area, cmdline_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(FOOTER_HEIGHT),
            Constraint::Length(CMDLINE_HEIGH),
        ])
        .areas(frame.area());

        self.draw_title(uidata, frame, title_area);
        self.draw_table(uidata, frame, table_area);
        self.draw_footer(uidata, frame, footer_area);
        self.draw_cmdline(uidata, frame, cmdline_area);

        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_title(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::from(format!(" {} ", uidata.name)).bold()];
        if uidata.loading {
            spans.push(Span::from(" loading ... ").yellow());
        }
        if !uidata.filters.is_empty() {
            spans.push(Span::from(format!(" {}", uidata.filters.join(" & "))).cyan());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)).reversed(), area);
    }

    fn header_cell(column: &ColumnView) -> Cell<'static> {
        let arrow = match column.sort {
            Some(SortDirection::Ascending) => " ▲",
            Some(SortDirection::Descending) => " ▼",
            None => "",
        };
        let cell = Cell::from(format!("{}{}", column.name, arrow)).bold();
        if column.filtered { cell.cyan() } else { cell }
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let nrows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);

        let header = Row::new(
            std::iter::once(Cell::from(""))
                .chain(uidata.table.iter().map(Self::header_cell)),
        )
        .underlined();

        let rows = (0..nrows).map(|ridx| {
            let marker = if uidata.marked.get(ridx).copied().unwrap_or(false) {
                Cell::from(SELECTION_MARKER).green()
            } else {
                Cell::from("")
            };
            let cells = uidata
                .table
                .iter()
                .map(|column| Cell::from(column.data[ridx].as_str()));
            Row::new(std::iter::once(marker).chain(cells))
        });

        let widths = std::iter::once(Constraint::Length(SELECTION_MARKER_WIDTH as u16)).chain(
            uidata
                .table
                .iter()
                .map(|column| Constraint::Length(column.width as u16)),
        );

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::new().on_dark_gray())
            .cell_highlight_style(Style::new().reversed());

        if nrows == 0 {
            self.table_state.select(None);
            self.table_state.select_column(None);
        } else {
            self.table_state.select(Some(uidata.cursor_row.min(nrows - 1)));
            // Column 0 is the selection marker
            self.table_state.select_column(Some(uidata.cursor_column + 1));
        }
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_footer(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        match uidata.export_progress {
            Some(percent) => {
                let [text_area, gauge_area] =
                    Layout::horizontal([Constraint::Min(0), Constraint::Length(30)]).areas(area);
                frame.render_widget(Paragraph::new(uidata.footer.as_str()).dim(), text_area);
                let gauge = Gauge::default()
                    .gauge_style(Style::new().green())
                    .label(format!("export {percent}%"))
                    .percent(u16::from(percent.min(100)));
                frame.render_widget(gauge, gauge_area);
            }
            None => {
                frame.render_widget(Paragraph::new(uidata.footer.as_str()).dim(), area);
            }
        }
    }

    fn draw_cmdline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput {
            let prompt = uidata.cmd_mode.map(|m| m.prompt()).unwrap_or("");
            let line = Line::from(vec![
                Span::from(prompt).bold(),
                Span::from(uidata.cmdinput.input.as_str()),
            ]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + uidata.cmdinput.cursor_pos) as u16;
            frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let status = Span::from(uidata.status_message.as_str());
        let status = match uidata.status_kind {
            NotifyKind::Error => status.red(),
            NotifyKind::Success => status.green(),
            NotifyKind::Info => status,
        };
        let help = Span::from(" ? help ").dim();
        let [status_area, help_area] =
            Layout::horizontal([Constraint::Min(0), Constraint::Length(8)]).areas(area);
        frame.render_widget(Paragraph::new(Line::from(status)), status_area);
        frame.render_widget(Paragraph::new(Line::from(help)), help_area);
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = Self::popup_area(frame.area(), 70, 80);
        let block = Block::bordered().title(format!(" {} ", uidata.popup_title).bold());
        let popup = Paragraph::new(uidata.popup_message.as_str())
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }

    fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
        let [_, middle, _] = Layout::vertical([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .areas(area);
        let [_, center, _] = Layout::horizontal([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .areas(middle);
        center
    }
}
