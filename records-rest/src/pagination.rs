//! Paging from `page=N[,size]` and `size=N` parameters

use crate::params::QueryParams;

#[derive(Debug, Clone, Copy)]
pub struct PaginationInfo {
    default_page_size: u64,
}

impl Default for PaginationInfo {
    fn default() -> Self {
        Self {
            default_page_size: 20,
        }
    }
}

impl PaginationInfo {
    /// Whether a page was requested; only then is the total count computed
    #[must_use]
    pub fn has_page(&self, params: &QueryParams) -> bool {
        params.contains("page")
    }

    /// Rows skipped before the requested page
    #[must_use]
    pub fn page_offset(&self, params: &QueryParams) -> u64 {
        let Some(page) = params.first("page") else {
            return 0;
        };
        let mut parts = page.splitn(2, ',');
        let number = parse_number(parts.next()).unwrap_or(1).max(1);
        let size = parse_number(parts.next()).unwrap_or(self.default_page_size);
        (number - 1).saturating_mul(size)
    }

    /// Maximum rows returned, if limited
    #[must_use]
    pub fn page_limit(&self, params: &QueryParams) -> Option<u64> {
        let page_size = params.first("page").map(|page| {
            parse_number(page.split(',').nth(1)).unwrap_or(self.default_page_size)
        });
        let result_size = self.result_size(params);
        match (page_size, result_size) {
            (Some(page), Some(size)) => Some(page.min(size)),
            (page, size) => page.or(size),
        }
    }

    /// Cap from the `size` parameter
    #[must_use]
    pub fn result_size(&self, params: &QueryParams) -> Option<u64> {
        parse_number(params.first("size"))
    }
}

fn parse_number(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<i64>().ok()).map(|n| n.max(0).unsigned_abs())
}
