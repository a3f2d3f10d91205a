//! UpdateLayoutUseCase: builds and edits the screen arrangement.
//!
//! [`build_screen_graph`] turns the configured screen names and links into a
//! validated [`ScreenGraph`].  [`apply_edit`] changes a live graph on behalf
//! of the admin surface.
//!
//! # Implied reverse links (for beginners)
//!
//! Writing "desk right → laptop" in the config is enough: the graph stores
//! "laptop left → desk" at the same time.  Spelling out the reverse by hand
//! is allowed, but it must agree.  "laptop left → tablet" next to
//! "desk right → laptop" would leave the cursor unable to come back the way
//! it went, so it is rejected as a contradiction.

use synergy_core::protocol::OptionId;
use synergy_core::{Edge, GraphError, ScreenGraph};
use thiserror::Error;

/// Options sent to a screen in `DSOP`: `(option id, value)` pairs.
pub type ScreenOptions = Vec<(OptionId, i32)>;

/// Error type for layout building.
#[derive(Debug, Error, PartialEq)]
pub enum UpdateLayoutError {
    #[error("primary screen {0:?} is not listed in [[screens]]")]
    MissingPrimary(String),

    #[error("invalid screen arrangement: {0}")]
    Graph(#[from] GraphError),
}

/// One declared neighbour link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenLink {
    pub screen: String,
    pub edge: Edge,
    pub neighbour: String,
}

/// A change requested through the admin surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutEdit {
    Link(ScreenLink),
    Unlink { screen: String, edge: Edge },
}

/// Builds the screen graph.
///
/// # Errors
///
/// - [`UpdateLayoutError::MissingPrimary`] if `primary` is not in `screens`.
/// - [`GraphError::DuplicateScreen`] for a name listed twice.
/// - [`GraphError::UnknownScreen`] for a link naming an undeclared screen.
/// - [`GraphError::Contradiction`] when two links claim the same edge.
/// - [`GraphError::SelfLink`] for a screen linked to itself.
pub fn build_screen_graph(
    primary: &str,
    screens: &[String],
    links: &[ScreenLink],
) -> Result<ScreenGraph, UpdateLayoutError> {
    if !screens.iter().any(|s| s == primary) {
        return Err(UpdateLayoutError::MissingPrimary(primary.to_string()));
    }

    let mut graph = ScreenGraph::new(primary);
    let mut primary_seen = false;
    for name in screens {
        if name == primary && !primary_seen {
            primary_seen = true;
            continue;
        }
        graph.add_screen(name.clone())?;
    }

    for link in links {
        graph.link(&link.screen, link.edge, &link.neighbour)?;
    }
    graph.validate()?;
    Ok(graph)
}

/// Applies `edit` to `graph`.  On error the graph is left unchanged.
///
/// Returns the neighbour an `Unlink` removed, if any.
pub fn apply_edit(graph: &mut ScreenGraph, edit: &LayoutEdit) -> Result<Option<String>, GraphError> {
    let mut candidate = graph.clone();
    let removed = match edit {
        LayoutEdit::Link(link) => {
            candidate.link(&link.screen, link.edge, &link.neighbour)?;
            None
        }
        LayoutEdit::Unlink { screen, edge } => candidate.unlink(screen, *edge)?,
    };
    candidate.validate()?;
    *graph = candidate;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn link(screen: &str, edge: Edge, neighbour: &str) -> ScreenLink {
        ScreenLink {
            screen: screen.to_string(),
            edge,
            neighbour: neighbour.to_string(),
        }
    }

    #[test]
    fn test_build_implies_reverse_links() {
        // Arrange
        let screens = names(&["desk", "laptop"]);
        let links = vec![link("desk", Edge::Right, "laptop")];

        // Act
        let graph = build_screen_graph("desk", &screens, &links).expect("valid layout");

        // Assert
        assert_eq!(graph.neighbour("desk", Edge::Right), Some("laptop"));
        assert_eq!(graph.neighbour("laptop", Edge::Left), Some("desk"));
    }

    #[test]
    fn test_build_accepts_an_explicit_matching_reverse() {
        let screens = names(&["desk", "laptop"]);
        let links = vec![
            link("desk", Edge::Right, "laptop"),
            link("laptop", Edge::Left, "desk"),
        ];
        assert!(build_screen_graph("desk", &screens, &links).is_ok());
    }

    #[test]
    fn test_build_rejects_contradicting_reverse() {
        // Arrange
        let screens = names(&["desk", "laptop", "tablet"]);
        let links = vec![
            link("desk", Edge::Right, "laptop"),
            link("laptop", Edge::Left, "tablet"),
        ];

        // Act
        let result = build_screen_graph("desk", &screens, &links);

        // Assert
        assert!(matches!(
            result,
            Err(UpdateLayoutError::Graph(GraphError::Contradiction { .. }))
        ));
    }

    #[test]
    fn test_build_rejects_missing_primary() {
        let result = build_screen_graph("desk", &names(&["laptop"]), &[]);
        assert_eq!(
            result,
            Err(UpdateLayoutError::MissingPrimary("desk".to_string()))
        );
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let result = build_screen_graph("desk", &names(&["desk", "laptop", "laptop"]), &[]);
        assert_eq!(
            result,
            Err(UpdateLayoutError::Graph(GraphError::DuplicateScreen(
                "laptop".to_string()
            )))
        );
    }

    #[test]
    fn test_build_rejects_duplicate_primary() {
        let result = build_screen_graph("desk", &names(&["desk", "desk"]), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_link_to_undeclared_screen() {
        let result = build_screen_graph(
            "desk",
            &names(&["desk"]),
            &[link("desk", Edge::Left, "ghost")],
        );
        assert_eq!(
            result,
            Err(UpdateLayoutError::Graph(GraphError::UnknownScreen(
                "ghost".to_string()
            )))
        );
    }

    #[test]
    fn test_apply_edit_links_and_unlinks() {
        // Arrange
        let mut graph = build_screen_graph("desk", &names(&["desk", "laptop"]), &[]).unwrap();

        // Act
        apply_edit(&mut graph, &LayoutEdit::Link(link("desk", Edge::Top, "laptop"))).unwrap();
        let removed = apply_edit(
            &mut graph,
            &LayoutEdit::Unlink {
                screen: "laptop".to_string(),
                edge: Edge::Bottom,
            },
        )
        .unwrap();

        // Assert
        assert_eq!(removed.as_deref(), Some("desk"));
        assert_eq!(graph.neighbour("desk", Edge::Top), None);
    }

    #[test]
    fn test_failed_edit_leaves_graph_unchanged() {
        // Arrange
        let mut graph = build_screen_graph(
            "desk",
            &names(&["desk", "laptop", "tablet"]),
            &[link("desk", Edge::Right, "laptop")],
        )
        .unwrap();
        let before = graph.clone();

        // Act
        let result = apply_edit(
            &mut graph,
            &LayoutEdit::Link(link("tablet", Edge::Right, "laptop")),
        );

        // Assert
        assert!(result.is_err());
        assert_eq!(graph, before);
    }
}
