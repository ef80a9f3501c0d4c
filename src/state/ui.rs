#[cfg(test)]
#[path = "ui_test.rs"]
mod ui_test;

/// Presentation flags colocated with the conversation: theme and menu.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UiState {
    pub theme: Theme,
    pub menu_open: bool,
}

impl UiState {
    /// Flip between the dark and wellness themes. Returns the new theme.
    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    /// Open the menu if closed, close it if open. Returns the new state.
    pub fn toggle_menu(&mut self) -> bool {
        self.menu_open = !self.menu_open;
        self.menu_open
    }

    pub fn close_menu(&mut self) {
        self.menu_open = false;
    }
}

/// Available color themes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Dark,
    Wellness,
}

impl Theme {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Wellness,
            Self::Wellness => Self::Dark,
        }
    }

    /// Label of the menu entry that switches away from this theme.
    #[must_use]
    pub fn toggle_label(self) -> &'static str {
        match self {
            Self::Dark => "Light Mode",
            Self::Wellness => "Dark Mode",
        }
    }
}
