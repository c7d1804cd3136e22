use std::collections::{BTreeSet, HashSet};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    /// Touching edges count as overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(other.right < self.left
            || other.left > self.right
            || other.bottom < self.top
            || other.top > self.bottom)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    names: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, name: &str) -> bool {
        if self.names.remove(name) {
            false
        } else {
            self.names.insert(name.to_string());
            true
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The select-all checkbox: checked selects every visible name,
    /// unchecked clears the selection.
    pub fn set_all<'a>(&mut self, visible: impl IntoIterator<Item = &'a str>, checked: bool) {
        if checked {
            self.names.extend(visible.into_iter().map(str::to_string));
        } else {
            self.names.clear();
        }
    }

    /// Drops names that are no longer on screen after a reload.
    pub fn retain_visible<'a>(&mut self, visible: impl IntoIterator<Item = &'a str>) {
        let visible: HashSet<&str> = visible.into_iter().collect();
        self.names.retain(|name| visible.contains(name.as_str()));
    }

    pub fn covers_all<'a>(&self, visible: impl IntoIterator<Item = &'a str>) -> bool {
        let mut any = false;
        for name in visible {
            any = true;
            if !self.names.contains(name) {
                return false;
            }
        }
        any
    }
}

/// One rubber-band drag over the grid. Each card toggles at most once per
/// gesture no matter how often the box passes over it.
#[derive(Debug)]
pub struct DragGesture {
    origin: (f64, f64),
    toggled: HashSet<String>,
}

impl DragGesture {
    pub fn begin(origin: (f64, f64)) -> Self {
        Self {
            origin,
            toggled: HashSet::new(),
        }
    }

    /// Moves the free corner to `pointer`, clamped to `bounds`, and toggles
    /// every not-yet-touched card the box now overlaps. Returns the names
    /// toggled by this move.
    pub fn update<'a, I>(
        &mut self,
        pointer: (f64, f64),
        bounds: &Rect,
        cards: I,
        selection: &mut Selection,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, Rect)>,
    {
        let clamped = (
            pointer.0.min(bounds.right).max(bounds.left),
            pointer.1.min(bounds.bottom).max(bounds.top),
        );
        let band = Rect::from_corners(self.origin, clamped);

        let mut changed = Vec::new();
        for (name, card) in cards {
            if band.intersects(&card) && self.toggled.insert(name.to_string()) {
                selection.toggle(name);
                changed.push(name.to_string());
            }
        }
        changed
    }

    pub fn finish(self) -> usize {
        self.toggled.len()
    }
}
