//! Memory-layout calculator (L1).
//!
//! Pure, deterministic, allocation-free: given a header and an ordered list
//! of `(size, align, count)` components, computes each component's byte
//! offset from the start of the block, the total block size, and the
//! alignment the whole block must be allocated at.

use crate::error::{Error, Result};

/// One component to be packed after the header.
#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub size: usize,
    pub align: usize,
    pub count: usize,
}

impl Component {
    pub fn new(size: usize, align: usize, count: usize) -> Self {
        Self { size, align, count }
    }
}

/// Computed layout: one offset per input component, the total size of the
/// block (header included), and the maximum alignment among header and
/// components.
#[derive(Debug, Clone)]
pub struct Layout {
    pub offsets: Vec<usize>,
    pub total_bytes: usize,
    pub master_align: usize,
}

fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

pub(crate) fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Computes offsets for `components` packed after a `header_size`-byte,
/// `header_align`-aligned header.
///
/// Starting from `header_size`, each component's offset is
/// `round_up(current, component.align)`; the cursor then advances to
/// `offset + size * count`. Fails with [`Error::Arg`] if `header_size == 0`,
/// any alignment is not a power of two, or any component has `count == 0` or
/// `size == 0`.
pub fn compute_layout(
    header_size: usize,
    header_align: usize,
    components: &[Component],
) -> Result<Layout> {
    if header_size == 0 || !is_power_of_two(header_align) {
        return Err(Error::Arg);
    }
    for c in components {
        if c.size == 0 || c.count == 0 || !is_power_of_two(c.align) {
            return Err(Error::Arg);
        }
    }

    let mut offsets = Vec::with_capacity(components.len());
    let mut current = header_size;
    let mut master_align = header_align;

    for c in components {
        let offset = round_up(current, c.align);
        offsets.push(offset);
        current = offset + c.size * c.count;
        master_align = master_align.max(c.align);
    }

    Ok(Layout {
        offsets,
        total_bytes: current,
        master_align,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_calculator_scenario() {
        let layout = compute_layout(
            24,
            8,
            &[Component::new(4, 4, 10), Component::new(8, 8, 3)],
        )
        .unwrap();
        assert_eq!(layout.offsets, vec![24, 64]);
        assert_eq!(layout.total_bytes, 88);
        assert_eq!(layout.master_align, 8);
    }

    #[test]
    fn rejects_zero_header_size() {
        assert!(matches!(compute_layout(0, 8, &[]), Err(Error::Arg)));
    }

    #[test]
    fn rejects_non_power_of_two_align() {
        assert!(matches!(
            compute_layout(8, 3, &[]),
            Err(Error::Arg)
        ));
    }

    #[test]
    fn rejects_zero_size_or_count_component() {
        assert!(matches!(
            compute_layout(8, 8, &[Component::new(0, 4, 1)]),
            Err(Error::Arg)
        ));
        assert!(matches!(
            compute_layout(8, 8, &[Component::new(4, 4, 0)]),
            Err(Error::Arg)
        ));
    }

    #[test]
    fn single_component_no_padding_needed() {
        let layout = compute_layout(16, 8, &[Component::new(8, 8, 2)]).unwrap();
        assert_eq!(layout.offsets, vec![16]);
        assert_eq!(layout.total_bytes, 32);
    }
}
