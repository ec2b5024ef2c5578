use std::time::Duration;
use tracing::trace;

use crate::domain::{GridConfig, GridError, Message};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &GridConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, GridError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    self.handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    pub fn handle_key(&self, key: KeyEvent) -> Option<Message> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Message::Quit),
                KeyCode::Char('f') => Some(Message::NextPage),
                KeyCode::Char('b') => Some(Message::PrevPage),
                _ => None,
            };
        }
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Esc => Some(Message::Exit),
            KeyCode::Enter => Some(Message::Enter),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Char('j') | KeyCode::Down => Some(Message::MoveDown),
            KeyCode::Char('k') | KeyCode::Up => Some(Message::MoveUp),
            KeyCode::Char('h') | KeyCode::Left => Some(Message::MoveLeft),
            KeyCode::Char('l') | KeyCode::Right => Some(Message::MoveRight),
            KeyCode::Char('n') | KeyCode::PageDown => Some(Message::NextPage),
            KeyCode::Char('p') | KeyCode::PageUp => Some(Message::PrevPage),
            KeyCode::Char('g') | KeyCode::Home => Some(Message::FirstPage),
            KeyCode::Char('G') | KeyCode::End => Some(Message::LastPage),
            KeyCode::Char('z') => Some(Message::CyclePageSize),
            KeyCode::Char('s') => Some(Message::SortAscending),
            KeyCode::Char('S') => Some(Message::SortDescending),
            KeyCode::Char('o') => Some(Message::ClearSort),
            KeyCode::Char('/') => Some(Message::Search),
            KeyCode::Char('f') => Some(Message::FilterColumn),
            KeyCode::Char('v') => Some(Message::Facets),
            KeyCode::Char('c') => Some(Message::ClearFilters),
            KeyCode::Char(' ') => Some(Message::ToggleSelect),
            KeyCode::Char('a') => Some(Message::SelectAllVisible),
            KeyCode::Char('A') => Some(Message::SelectNone),
            KeyCode::Char('y') => Some(Message::CopyRow),
            KeyCode::Char('e') => Some(Message::Export),
            KeyCode::Char('r') => Some(Message::Reload),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
