//! Per-county aggregation of observations.

use std::collections::BTreeMap;

use crate::fips::FipsCode;

use super::{CountyOutcome, Element, FetchError, Observation};

/// The four summaries written onto features. A metric is `None` when the
/// county had no observations of that element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CountySummary {
    pub avg_precip: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub avg_snow: Option<f64>,
}

impl CountySummary {
    pub fn is_empty(&self) -> bool {
        self.avg_precip.is_none()
            && self.max_temp.is_none()
            && self.min_temp.is_none()
            && self.avg_snow.is_none()
    }
}

/// Successful county summaries keyed by FIPS code.
pub type SummaryTable = BTreeMap<FipsCode, CountySummary>;

/// Averages precipitation and snowfall, and takes the extremes of the
/// temperatures. Each metric only sees values of its own element.
pub fn summarise(observations: &[Observation]) -> CountySummary {
    let values = |element: Element| {
        observations
            .iter()
            .filter(move |o| o.datatype == element)
            .map(|o| o.value)
    };

    CountySummary {
        avg_precip: mean(values(Element::Prcp)),
        max_temp: values(Element::Tmax).reduce(f64::max),
        min_temp: values(Element::Tmin).reduce(f64::min),
        avg_snow: mean(values(Element::Snow)),
    }
}

/// Summarises, treating a county with nothing to summarise as having no
/// observations.
pub fn outcome(observations: &[Observation]) -> CountyOutcome {
    let summary = summarise(observations);
    if summary.is_empty() {
        return Err(FetchError::NoObservations);
    }

    Ok(summary)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn obs(datatype: Element, values: &[f64]) -> Vec<Observation> {
        values.iter().map(|v| Observation::new(datatype, *v)).collect()
    }

    #[test]
    fn should_summarise_each_element() {
        let mut observations = obs(Element::Prcp, &[10.0, 20.0]);
        observations.extend(obs(Element::Tmax, &[250.0, 300.0]));
        observations.extend(obs(Element::Tmin, &[-10.0, 5.0]));
        observations.extend(obs(Element::Snow, &[0.0, 0.0]));

        let summary = summarise(&observations);

        assert_eq!(summary.avg_precip, Some(15.0));
        assert_eq!(summary.max_temp, Some(300.0));
        assert_eq!(summary.min_temp, Some(-10.0));
        assert_eq!(summary.avg_snow, Some(0.0));
    }

    #[test]
    fn should_ignore_unrelated_elements() {
        let mut observations = obs(Element::Prcp, &[4.0]);
        observations.extend(obs(Element::Other, &[1000.0, -1000.0]));
        observations.extend(obs(Element::Tmax, &[12.0]));

        let summary = summarise(&observations);

        assert_eq!(summary.avg_precip, Some(4.0));
        assert_eq!(summary.max_temp, Some(12.0));
        assert_eq!(summary.min_temp, None);
        assert_eq!(summary.avg_snow, None);
    }

    #[test]
    fn should_leave_empty_metrics_unset() {
        let summary = summarise(&obs(Element::Tmin, &[-3.0, -8.0]));

        assert_eq!(summary.min_temp, Some(-8.0));
        assert_eq!(summary.avg_precip, None);
        assert_eq!(summary.avg_snow, None);
    }

    #[test]
    fn should_treat_nothing_to_summarise_as_no_observations() {
        assert!(matches!(outcome(&[]), Err(FetchError::NoObservations)));
        assert!(matches!(
            outcome(&obs(Element::Other, &[1.0])),
            Err(FetchError::NoObservations)
        ));
        assert!(outcome(&obs(Element::Snow, &[2.0])).is_ok());
    }
}
