use serde::Serialize;

use crate::models::enums::{Category, Role, StageCode};

/// One stage of a resolved approval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageSpec {
    pub stage_number: u32,
    pub stage_code: StageCode,
    pub required_role: Role,
}

fn stage_codes(category: Category) -> &'static [StageCode] {
    use StageCode::*;
    match category {
        Category::RanMw | Category::Unknown => &[FopRtsReview, RegionReview, RthReview],
        Category::SoftwareLicense => &[BoReview, SmeReview, HeadNocReview],
        Category::PlnUpgrade | Category::DismantleKeep => &[RohReview, RthReview],
        Category::DismantleDrop => &[FopRtsReview, RegionReview, PmoReview],
    }
}

/// Ordered review stages for a category, numbered from 1.
pub fn resolve_path(category: Category) -> Vec<StageSpec> {
    stage_codes(category)
        .iter()
        .zip(1u32..)
        .map(|(code, stage_number)| StageSpec {
            stage_number,
            stage_code: *code,
            required_role: code.required_role(),
        })
        .collect()
}
