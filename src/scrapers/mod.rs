pub mod browser;
pub mod cvs;
pub mod traits;
pub mod types;
pub mod walgreens;

pub use browser::BrowserSession;
pub use cvs::CvsScraper;
pub use traits::ScraperTrait;
pub use walgreens::WalgreensScraper;

use crate::config::Site;

/// Scraper for a site, driving the shared browser
pub fn build(site: Site, session: BrowserSession) -> Box<dyn ScraperTrait> {
    match site {
        Site::Cvs => Box::new(CvsScraper::new(session)),
        Site::Walgreens => Box::new(WalgreensScraper::new(session)),
    }
}
