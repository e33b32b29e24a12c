//! Directional pane navigation (§4.5): given a current rectangle and a
//! direction, pick the best adjacent candidate by center-to-center
//! gating, then rank by (primary separation, secondary separation),
//! breaking ties with a "beam" heuristic.

use crate::types::{FocusDir, Rect};

/// True iff `candidate`'s center lies strictly beyond `from`'s center
/// along the direction's primary axis.
fn in_direction(from: Rect, candidate: Rect, dir: FocusDir) -> bool {
    let (fx, fy) = from.center();
    let (cx, cy) = candidate.center();
    match dir {
        FocusDir::Left => cx < fx,
        FocusDir::Right => cx > fx,
        FocusDir::Up => cy < fy,
        FocusDir::Down => cy > fy,
    }
}

/// Gap between two 1-D ranges along an axis; 0 if they overlap.
fn range_gap(a_lo: i32, a_hi: i32, b_lo: i32, b_hi: i32) -> i32 {
    if a_hi <= b_lo {
        b_lo - a_hi
    } else if b_hi <= a_lo {
        a_lo - b_hi
    } else {
        0
    }
}

fn primary_separation(from: Rect, candidate: Rect, dir: FocusDir) -> i32 {
    match dir {
        FocusDir::Left => range_gap(candidate.x as i32, candidate.right(), from.x as i32, from.right()),
        FocusDir::Right => range_gap(from.x as i32, from.right(), candidate.x as i32, candidate.right()),
        FocusDir::Up => range_gap(candidate.y as i32, candidate.bottom(), from.y as i32, from.bottom()),
        FocusDir::Down => range_gap(from.y as i32, from.bottom(), candidate.y as i32, candidate.bottom()),
    }
}

fn secondary_separation(from: Rect, candidate: Rect, dir: FocusDir) -> i32 {
    match dir {
        FocusDir::Left | FocusDir::Right => {
            range_gap(from.y as i32, from.bottom(), candidate.y as i32, candidate.bottom())
        }
        FocusDir::Up | FocusDir::Down => {
            range_gap(from.x as i32, from.right(), candidate.x as i32, candidate.right())
        }
    }
}

/// True if `candidate`'s perpendicular range contains the cursor
/// column/row from `from` — used only to break ties.
fn beam_contains(candidate: Rect, cursor_x: i32, cursor_y: i32, dir: FocusDir) -> bool {
    match dir {
        FocusDir::Left | FocusDir::Right => {
            cursor_y >= candidate.y as i32 && cursor_y < candidate.bottom()
        }
        FocusDir::Up | FocusDir::Down => cursor_x >= candidate.x as i32 && cursor_x < candidate.right(),
    }
}

/// L1 (Manhattan) distance from a point to the nearest edge of `rect`;
/// zero if the point is inside. Utility for cursor-based variants.
pub fn point_to_rect_l1(px: i32, py: i32, rect: Rect) -> i32 {
    let dx = if px < rect.x as i32 {
        rect.x as i32 - px
    } else if px >= rect.right() {
        px - rect.right() + 1
    } else {
        0
    };
    let dy = if py < rect.y as i32 {
        rect.y as i32 - py
    } else if py >= rect.bottom() {
        py - rect.bottom() + 1
    } else {
        0
    };
    dx + dy
}

/// Picks the index (into `candidates`) of the best pane to focus when
/// moving `dir` from `from`. `cursor` is the focused pane's cursor
/// position in screen coordinates, used only to break ties.
pub fn next_in_direction(from: Rect, candidates: &[Rect], dir: FocusDir, cursor: (i32, i32)) -> Option<usize> {
    let mut best: Option<(usize, i32, i32, bool)> = None;
    for (i, &cand) in candidates.iter().enumerate() {
        if !in_direction(from, cand, dir) {
            continue;
        }
        let primary = primary_separation(from, cand, dir);
        let secondary = secondary_separation(from, cand, dir);
        let on_beam = beam_contains(cand, cursor.0, cursor.1, dir);
        let better = match &best {
            None => true,
            Some((_, bp, bs, bbeam)) => {
                (primary, secondary, !on_beam) < (*bp, *bs, !*bbeam)
            }
        };
        if better {
            best = Some((i, primary, secondary, on_beam));
        }
    }
    best.map(|(i, ..)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_closer_pane_to_the_right() {
        let from = Rect::new(0, 0, 10, 10);
        let near = Rect::new(10, 0, 10, 10);
        let far = Rect::new(20, 0, 10, 10);
        let picked = next_in_direction(from, &[far, near], FocusDir::Right, (5, 5)).unwrap();
        assert_eq!(picked, 1);
    }

    #[test]
    fn excludes_panes_not_in_direction() {
        let from = Rect::new(10, 0, 10, 10);
        let left = Rect::new(0, 0, 10, 10);
        assert_eq!(next_in_direction(from, &[left], FocusDir::Right, (15, 5)), None);
    }

    #[test]
    fn beam_breaks_ties_between_equidistant_candidates() {
        let from = Rect::new(0, 0, 10, 10);
        // two candidates at the same primary gap (0, touching), one of
        // which straddles the cursor row.
        let top = Rect::new(10, 0, 10, 5);
        let bottom = Rect::new(10, 5, 10, 5);
        let cursor = (5, 7); // inside `bottom`'s row range
        let picked = next_in_direction(from, &[top, bottom], FocusDir::Right, cursor).unwrap();
        assert_eq!(picked, 1);
    }

    #[test]
    fn is_pure_function_of_geometry_independent_of_order() {
        let from = Rect::new(0, 0, 10, 10);
        let a = Rect::new(10, 0, 10, 10);
        let b = Rect::new(20, 0, 10, 10);
        let forward = next_in_direction(from, &[a, b], FocusDir::Right, (0, 0));
        let reversed = next_in_direction(from, &[b, a], FocusDir::Right, (0, 0));
        assert_eq!(forward.map(|i| [a, b][i]), reversed.map(|i| [b, a][i]));
    }

    #[test]
    fn point_to_rect_l1_zero_when_inside() {
        let r = Rect::new(5, 5, 10, 10);
        assert_eq!(point_to_rect_l1(7, 7, r), 0);
        assert_eq!(point_to_rect_l1(0, 0, r), 10);
    }
}
