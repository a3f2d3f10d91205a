//! The screen-arrangement graph.
//!
//! Screens are nodes identified by their unique name.  Each screen has four
//! optional neighbour links, one per [`Edge`].  Links are always stored in
//! both directions: linking `A` right to `B` also links `B` left to `A`, and
//! unlinking removes both halves.  Because every mutation keeps that pairing,
//! [`ScreenGraph::validate`] only fails on graphs assembled by hand.
//!
//! Exactly one screen is the *primary*: the machine whose real keyboard and
//! mouse drive everything.  It can never be removed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One side of a rectangular screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom];

    /// The edge the cursor arrives through after leaving via `self`.
    pub fn opposite(self) -> Edge {
        match self {
            Edge::Left => Edge::Right,
            Edge::Right => Edge::Left,
            Edge::Top => Edge::Bottom,
            Edge::Bottom => Edge::Top,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Edge::Left => "left",
            Edge::Right => "right",
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        }
    }

    fn index(self) -> usize {
        match self {
            Edge::Left => 0,
            Edge::Right => 1,
            Edge::Top => 2,
            Edge::Bottom => 3,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Edge {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Edge::Left),
            "right" => Ok(Edge::Right),
            "top" | "up" => Ok(Edge::Top),
            "bottom" | "down" => Ok(Edge::Bottom),
            _ => Err(GraphError::UnknownEdge(s.to_string())),
        }
    }
}

/// Errors raised by graph mutations and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown screen {0:?}")]
    UnknownScreen(String),

    #[error("screen {0:?} is declared more than once")]
    DuplicateScreen(String),

    #[error("the primary screen {0:?} cannot be removed")]
    PrimaryRemoval(String),

    #[error("screen {0:?} cannot be its own neighbour")]
    SelfLink(String),

    /// Linking would overwrite an existing, different link on either end.
    #[error("{screen} {edge} already leads to {existing:?}, cannot also lead to {requested:?}")]
    Contradiction {
        screen: String,
        edge: Edge,
        existing: String,
        requested: String,
    },

    #[error("{screen} {edge} leads to {neighbour:?} but {neighbour} {} does not lead back", .edge.opposite())]
    NotReciprocal {
        screen: String,
        edge: Edge,
        neighbour: String,
    },

    #[error("unknown edge {0:?} (expected left, right, top or bottom)")]
    UnknownEdge(String),
}

type Links = [Option<String>; 4];

/// Screens and their neighbour links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenGraph {
    primary: String,
    screens: BTreeMap<String, Links>,
}

impl ScreenGraph {
    /// Creates a graph containing only the primary screen.
    pub fn new(primary: impl Into<String>) -> Self {
        let primary = primary.into();
        let mut screens = BTreeMap::new();
        screens.insert(primary.clone(), Links::default());
        Self { primary, screens }
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn contains(&self, name: &str) -> bool {
        self.screens.contains_key(name)
    }

    /// Screen names in sorted order.
    pub fn screens(&self) -> impl Iterator<Item = &str> {
        self.screens.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn add_screen(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        if self.screens.contains_key(&name) {
            return Err(GraphError::DuplicateScreen(name));
        }
        self.screens.insert(name, Links::default());
        Ok(())
    }

    /// Removes a screen and every link pointing at it.
    pub fn remove_screen(&mut self, name: &str) -> Result<(), GraphError> {
        if name == self.primary {
            return Err(GraphError::PrimaryRemoval(name.to_string()));
        }
        if self.screens.remove(name).is_none() {
            return Err(GraphError::UnknownScreen(name.to_string()));
        }
        for links in self.screens.values_mut() {
            for slot in links.iter_mut() {
                if slot.as_deref() == Some(name) {
                    *slot = None;
                }
            }
        }
        Ok(())
    }

    /// Links `screen`'s `edge` to `neighbour` and `neighbour`'s opposite edge
    /// back to `screen`.
    ///
    /// Re-linking an existing identical pair is a no-op.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownScreen`] if either name is not in the graph.
    /// - [`GraphError::SelfLink`] if both names are the same.
    /// - [`GraphError::Contradiction`] if either slot already holds a
    ///   different screen.  The graph is left unchanged.
    pub fn link(&mut self, screen: &str, edge: Edge, neighbour: &str) -> Result<(), GraphError> {
        self.require(screen)?;
        self.require(neighbour)?;
        if screen == neighbour {
            return Err(GraphError::SelfLink(screen.to_string()));
        }
        self.check_slot(screen, edge, neighbour)?;
        self.check_slot(neighbour, edge.opposite(), screen)?;

        self.set_slot(screen, edge, Some(neighbour.to_string()));
        self.set_slot(neighbour, edge.opposite(), Some(screen.to_string()));
        Ok(())
    }

    /// Removes the link on `screen`'s `edge` and its reciprocal.
    ///
    /// Returns the former neighbour, or `None` when the edge was already free.
    pub fn unlink(&mut self, screen: &str, edge: Edge) -> Result<Option<String>, GraphError> {
        self.require(screen)?;
        let former = self.set_slot(screen, edge, None);
        if let Some(other) = &former {
            if self.neighbour(other, edge.opposite()) == Some(screen) {
                self.set_slot(other, edge.opposite(), None);
            }
        }
        Ok(former)
    }

    /// The screen beyond `edge` of `screen`, if any.
    pub fn neighbour(&self, screen: &str, edge: Edge) -> Option<&str> {
        self.screens
            .get(screen)
            .and_then(|links| links[edge.index()].as_deref())
    }

    /// All linked edges of `screen` in [`Edge::ALL`] order.
    pub fn neighbours(&self, screen: &str) -> Vec<(Edge, &str)> {
        Edge::ALL
            .iter()
            .filter_map(|&edge| self.neighbour(screen, edge).map(|n| (edge, n)))
            .collect()
    }

    /// Checks that every link points at a known screen that links back.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (name, links) in &self.screens {
            for edge in Edge::ALL {
                let Some(other) = links[edge.index()].as_deref() else {
                    continue;
                };
                self.require(other)?;
                if self.neighbour(other, edge.opposite()) != Some(name.as_str()) {
                    return Err(GraphError::NotReciprocal {
                        screen: name.clone(),
                        edge,
                        neighbour: other.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<(), GraphError> {
        if self.screens.contains_key(name) {
            Ok(())
        } else {
            Err(GraphError::UnknownScreen(name.to_string()))
        }
    }

    fn check_slot(&self, screen: &str, edge: Edge, requested: &str) -> Result<(), GraphError> {
        match self.neighbour(screen, edge) {
            Some(existing) if existing != requested => Err(GraphError::Contradiction {
                screen: screen.to_string(),
                edge,
                existing: existing.to_string(),
                requested: requested.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn set_slot(&mut self, screen: &str, edge: Edge, value: Option<String>) -> Option<String> {
        match self.screens.get_mut(screen) {
            Some(links) => std::mem::replace(&mut links[edge.index()], value),
            None => None,
        }
    }

    #[cfg(test)]
    fn set_one_way(&mut self, screen: &str, edge: Edge, neighbour: &str) {
        self.set_slot(screen, edge, Some(neighbour.to_string()));
    }
}
