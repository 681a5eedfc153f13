use core::fmt;

/// Kernel initialization status tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// Kernel component status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, InitStatus::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed)
    }
}

pub const MAX_COMPONENTS: usize = 12;

/// Boot phases in registration order.
#[derive(Debug, Clone)]
pub struct ComponentTable {
    entries: [Option<ComponentStatus>; MAX_COMPONENTS],
    len: usize,
}

impl ComponentTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_COMPONENTS],
            len: 0,
        }
    }

    /// Track `name`. Registering the same name twice keeps one entry; names
    /// past the capacity are not tracked.
    pub fn register(&mut self, name: &'static str) -> bool {
        if self.get(name).is_some() {
            return true;
        }
        if self.len == MAX_COMPONENTS {
            return false;
        }
        self.entries[self.len] = Some(ComponentStatus::new(name));
        self.len += 1;
        true
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(comp) = self.entries[..self.len]
            .iter_mut()
            .flatten()
            .find(|c| c.name == name)
        {
            comp.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<ComponentStatus> {
        self.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = ComponentStatus> + '_ {
        self.entries[..self.len].iter().flatten().copied()
    }

    /// Check if all components are initialized
    pub fn all_ready(&self) -> bool {
        self.len > 0 && self.iter().all(|c| c.is_complete())
    }
}

impl Default for ComponentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed => write!(f, "Failed"),
        }
    }
}
