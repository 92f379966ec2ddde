use crate::error::AppError;
use crate::fields::FieldSet;
use crate::profile::FieldSpecs;
use crate::traits::{Extractor, PageSession};

/// Reads every field locator in one session round trip.
///
/// Absent nodes become empty strings; the percent rule is applied by the
/// worker once the whole set is assembled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocatorExtractor;

impl Extractor for LocatorExtractor {
    async fn extract<S: PageSession>(
        &self,
        session: &mut S,
        specs: &FieldSpecs,
    ) -> Result<FieldSet, AppError> {
        let locators = specs.locators();
        let values = session.read_texts(&locators).await?;
        if values.len() != locators.len() {
            return Err(AppError::ExtractionError(format!(
                "Expected {} values, page returned {}",
                locators.len(),
                values.len()
            )));
        }

        Ok(FieldSet::from_lookups(
            specs.iter().map(|(field, _)| field).zip(values),
        ))
    }
}
