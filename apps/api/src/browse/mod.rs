pub mod handlers;

use serde::Deserialize;

use crate::store::pagination::PageRequest;
use crate::store::predicates::BrowseFilter;

/// Query string of `GET /api/v1/movies`.
#[derive(Debug, Default, Deserialize)]
pub struct BrowseParams {
    pub genre_id: Option<i32>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub rating_min: Option<f64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl BrowseParams {
    pub fn into_request(self) -> Result<(BrowseFilter, PageRequest), String> {
        let filter = BrowseFilter {
            genre_id: self.genre_id,
            year_min: self.year_min,
            year_max: self.year_max,
            rating_min: self.rating_min,
        };
        filter.validate()?;
        let page = PageRequest::new(self.page, self.page_size)?;
        Ok((filter, page))
    }
}
