use types::ClassGroup;

/// Required and preferred teacher counts for a cell. `None` means no target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaffingTargets {
    pub required: Option<u32>,
    pub preferred: Option<u32>,
}

/// `ceil(enrollment / ratio)`, or no target when either input is missing or
/// the ratio is zero.
pub fn teachers_needed(enrollment: Option<u32>, ratio: Option<u32>) -> Option<u32> {
    match (enrollment, ratio) {
        (Some(e), Some(r)) if r > 0 => Some(e.div_ceil(r)),
        _ => None,
    }
}

pub fn targets(enrollment: Option<u32>, group: Option<&ClassGroup>) -> StaffingTargets {
    let Some(group) = group else {
        return StaffingTargets::default();
    };
    StaffingTargets {
        required: teachers_needed(enrollment, Some(group.required_ratio)),
        preferred: group
            .preferred_ratio
            .and_then(|r| teachers_needed(enrollment, Some(r))),
    }
}

fn age_rank(g: &ClassGroup) -> (bool, Option<u32>, &str) {
    (g.min_age.is_none(), g.min_age, g.id.0.as_str())
}

/// The group whose ratio governs a multi-group cell: the active group with the
/// lowest `min_age`, ties broken by id. Groups without a `min_age` rank last.
pub fn authoritative_group<'a, I>(groups: I) -> Option<&'a ClassGroup>
where
    I: IntoIterator<Item = &'a ClassGroup>,
{
    groups
        .into_iter()
        .filter(|g| g.is_active)
        .min_by(|a, b| age_rank(a).cmp(&age_rank(b)))
}
