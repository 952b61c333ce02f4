use crate::gpu::{DescriptorSetLayout, PushConstantRange};

/// The layout of a material: descriptor-set layouts ordered by set index and
/// the push-constant ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialLayout {
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl MaterialLayout {
    #[must_use]
    pub fn new(
        set_layouts: Vec<DescriptorSetLayout>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> Self {
        Self {
            set_layouts,
            push_constant_ranges,
        }
    }

    #[must_use]
    pub fn set_count(&self) -> usize {
        self.set_layouts.len()
    }

    #[must_use]
    pub fn push_constant_count(&self) -> usize {
        self.push_constant_ranges.len()
    }

    /// Length of the matching descriptor-set layout prefix. A set index `i`
    /// of `other` is usable with this layout iff `compat_prefix(other) > i`.
    #[must_use]
    pub fn compat_prefix(&self, other: &Self) -> usize {
        self.set_layouts
            .iter()
            .zip(&other.set_layouts)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Whether the push-constant ranges of both layouts are identical.
    #[must_use]
    pub fn push_constants_compatible(&self, other: &Self) -> bool {
        self.push_constant_ranges == other.push_constant_ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DescriptorBinding, DescriptorKind, ShaderStages};

    fn set_layout(binding: u32, kind: DescriptorKind) -> DescriptorSetLayout {
        DescriptorSetLayout::new(vec![DescriptorBinding {
            binding,
            kind,
            count: 1,
            stages: ShaderStages::FRAGMENT,
        }])
    }

    #[test]
    fn compat_prefix_counts_leading_equal_sets() {
        let a = MaterialLayout::new(
            vec![
                set_layout(0, DescriptorKind::UniformBuffer),
                set_layout(0, DescriptorKind::SampledImage),
            ],
            vec![],
        );
        let b = MaterialLayout::new(
            vec![
                set_layout(0, DescriptorKind::UniformBuffer),
                set_layout(0, DescriptorKind::StorageImage),
            ],
            vec![],
        );
        assert_eq!(a.compat_prefix(&a), 2);
        assert_eq!(a.compat_prefix(&b), 1);
        assert_eq!(b.compat_prefix(&a), 1);
    }

    #[test]
    fn push_constant_compatibility_requires_equal_ranges() {
        let range = PushConstantRange {
            offset: 0,
            size: 16,
            stages: ShaderStages::VERTEX,
        };
        let a = MaterialLayout::new(vec![], vec![range.clone()]);
        let b = MaterialLayout::new(vec![], vec![]);
        assert!(a.push_constants_compatible(&a));
        assert!(!a.push_constants_compatible(&b));
    }
}
