//! Bracket construction from an unordered participant list.

use crate::models::{rounds_for, BracketTree, NodeState, TournamentError};
use std::collections::VecDeque;

/// Build a single-elimination tree, seeding in insertion order.
///
/// Each new participant splits the oldest pending leaf of the current layer: the
/// incumbent moves to the left child, the newcomer to the right. Once a layer is
/// exhausted the children become the next layer. Leaves that end up shallower than
/// the deepest round are byes.
pub fn build_bracket<T: Clone + PartialEq>(
    participants: &[T],
) -> Result<BracketTree<T>, TournamentError> {
    let (first, rest) = match participants.split_first() {
        Some(split) if participants.len() >= 2 => split,
        _ => return Err(TournamentError::NotEnoughPlayers { required: 2 }),
    };

    let mut tree = BracketTree::with_root(first.clone());
    let mut current_layer = VecDeque::from([tree.root()]);
    let mut next_layer = VecDeque::new();

    for participant in rest {
        if current_layer.is_empty() {
            std::mem::swap(&mut current_layer, &mut next_layer);
        }
        let Some(target) = current_layer.pop_front() else {
            break;
        };
        let (left, right) = tree.split_leaf(target, participant.clone());
        next_layer.push_back(left);
        next_layer.push_back(right);
    }

    tree.total_rounds = rounds_for(participants.len());

    for id in tree.node_ids().collect::<Vec<_>>() {
        if let Some((Some(_), Some(_))) = tree.pairing(id) {
            tree.node_mut(id).state = NodeState::Available;
        }
    }

    let total_rounds = tree.total_rounds;
    tree.byes = tree
        .leaves()
        .into_iter()
        .filter(|&id| tree.depth(id) < total_rounds)
        .filter_map(|id| tree.node(id).occupant.clone())
        .collect();

    Ok(tree)
}
