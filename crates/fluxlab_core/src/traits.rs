use crate::grid::GridField;

/// A double-buffered update rule over a [`GridField`].
///
/// Implementations read exclusively from `current` and write every interior
/// cell of `next`. Boundary cells of `next` must be left untouched.
pub trait FieldUpdate {
    fn update(&self, current: &GridField, next: &mut GridField);
}

/// Applies one update and swaps the buffers so that `current` holds the new
/// field. `scratch` must start out with the same boundary values as `current`;
/// since neither buffer's boundary is ever written, that stays true.
pub fn advance(rule: &impl FieldUpdate, current: &mut GridField, scratch: &mut GridField) {
    rule.update(current, scratch);
    std::mem::swap(current, scratch);
}

/// Visits every interior cell `(i, j)` with `1 ≤ i < nx-1`, `1 ≤ j < ny-1`.
#[inline]
pub(crate) fn for_each_interior(nx: usize, ny: usize, mut f: impl FnMut(usize, usize)) {
    for i in 1..nx.saturating_sub(1) {
        for j in 1..ny.saturating_sub(1) {
            f(i, j);
        }
    }
}
