use crate::models::enums::PunchlistSeverity;

/// Highest severity present. Empty input evaluates to `None`.
pub fn evaluate<I>(severities: I) -> PunchlistSeverity
where
    I: IntoIterator<Item = PunchlistSeverity>,
{
    severities
        .into_iter()
        .max()
        .unwrap_or(PunchlistSeverity::None)
}
