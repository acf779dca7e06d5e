// src/forecast.rs
//! Additive trend + seasonality forecaster.
//!
//! The model is `y(t) = trend(t) + yearly(t) + weekly(t) + noise`, where the
//! trend is piecewise linear with hinges at evenly spaced changepoints and the
//! seasonal terms are Fourier series. Coefficients are the MAP estimate under
//! Gaussian priors, which reduces to ridge regression with a per-column
//! penalty of `sigma^2 / prior_scale^2`.

use crate::error::{DashboardError, Result};
use crate::models::{horizon_days, ForecastPoint, ForecastSeries, PriceSeries, TrainingPoint};
use chrono::{Days, NaiveDate};
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

const YEAR_DAYS: f64 = 365.25;
const WEEK_DAYS: f64 = 7.0;
// Prior scale of the intercept and base slope.
const BASE_PRIOR_SCALE: f64 = 5.0;
const RIDGE_FLOOR: f64 = 1e-9;
// Smallest noise level (scaled units) the interval is built from.
const SIGMA_FLOOR: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct ForecastSettings {
    pub n_changepoints: usize,
    /// Share of the history (from the start) that may hold changepoints.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub yearly_order: usize,
    pub weekly_order: usize,
    /// Coverage of `yhat_lower..yhat_upper`.
    pub interval_width: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        ForecastSettings {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_order: 10,
            weekly_order: 3,
            interval_width: 0.8,
        }
    }
}

/// `(Date, Close)` renamed to `(ds, y)`.
pub fn training_frame(series: &PriceSeries) -> Vec<TrainingPoint> {
    series
        .bars
        .iter()
        .map(|bar| TrainingPoint {
            ds: bar.date,
            y: bar.close,
        })
        .collect()
}

/// Fit on the close prices of `series` and predict history plus `years * 365` days.
pub fn forecast(
    series: &PriceSeries,
    years: u32,
    settings: &ForecastSettings,
) -> Result<ForecastSeries> {
    let model = AdditiveModel::new(settings.clone()).fit(&training_frame(series))?;
    let dates = model.make_future_dates(horizon_days(years));
    let points = model.predict(&dates);
    info!(
        "Forecast {} for {} year(s): {} points, {} changepoints, yearly={}, weekly={}",
        series.ticker,
        years,
        points.len(),
        model.changepoint_count(),
        model.has_yearly(),
        model.has_weekly()
    );
    Ok(ForecastSeries {
        ticker: series.ticker.clone(),
        points,
    })
}

pub struct AdditiveModel {
    settings: ForecastSettings,
}

impl AdditiveModel {
    pub fn new(settings: ForecastSettings) -> Self {
        AdditiveModel { settings }
    }

    pub fn fit(self, frame: &[TrainingPoint]) -> Result<FittedModel> {
        let history = clean(frame);
        if history.len() < 2 {
            return Err(DashboardError::Forecast(format!(
                "need at least two dated observations, got {}",
                history.len()
            )));
        }

        let start = history[0].ds;
        let end = history[history.len() - 1].ds;
        let span_days = (end - start).num_days() as f64;
        let y_scale = history
            .iter()
            .map(|p| p.y.abs())
            .fold(0.0, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let min_spacing = history
            .windows(2)
            .map(|w| (w[1].ds - w[0].ds).num_days())
            .min()
            .unwrap_or(0);
        let yearly = span_days >= 2.0 * 365.0;
        let weekly = span_days >= 14.0 && min_spacing < 7;

        let ts: Vec<f64> = history
            .iter()
            .map(|p| (p.ds - start).num_days() as f64 / span_days)
            .collect();
        let changepoints = place_changepoints(
            &ts,
            self.settings.n_changepoints,
            self.settings.changepoint_range,
        );
        debug!(
            "Fitting {} points: {} changepoints, yearly={}, weekly={}",
            history.len(),
            changepoints.len(),
            yearly,
            weekly
        );

        let z = normal_quantile(0.5 + self.settings.interval_width / 2.0)?;
        let mut model = FittedModel {
            settings: self.settings,
            start,
            span_days,
            y_scale,
            changepoints,
            yearly,
            weekly,
            beta: DVector::zeros(0),
            sigma: 0.0,
            z,
            delta_scale: 0.0,
            history_dates: history.iter().map(|p| p.ds).collect(),
        };

        let n = history.len();
        let p = model.n_features();
        let mut flat = Vec::with_capacity(n * p);
        for point in &history {
            flat.extend(model.features(point.ds));
        }
        let x = DMatrix::from_row_slice(n, p, &flat);
        let y = DVector::from_iterator(n, history.iter().map(|p| p.y / y_scale));

        // First pass only estimates the noise level the priors are scaled by.
        let rough = solve_ridge(&x, &y, &vec![RIDGE_FLOOR; p])?;
        let rough_var = residual_variance(&x, &y, &rough);
        let beta = solve_ridge(&x, &y, &model.penalties(rough_var))?;

        model.sigma = residual_variance(&x, &y, &beta).sqrt().max(SIGMA_FLOOR);
        let deltas = model.deltas(&beta);
        model.delta_scale = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };
        model.beta = beta;
        Ok(model)
    }
}

pub struct FittedModel {
    settings: ForecastSettings,
    start: NaiveDate,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    yearly: bool,
    weekly: bool,
    beta: DVector<f64>,
    sigma: f64,
    /// Standard normal quantile for the interval width.
    z: f64,
    delta_scale: f64,
    history_dates: Vec<NaiveDate>,
}

struct Components {
    trend: f64,
    yearly: Option<f64>,
    weekly: Option<f64>,
}

impl FittedModel {
    pub fn has_yearly(&self) -> bool {
        self.yearly
    }

    pub fn has_weekly(&self) -> bool {
        self.weekly
    }

    pub fn changepoint_count(&self) -> usize {
        self.changepoints.len()
    }

    /// Historical dates followed by `periods` consecutive days.
    pub fn make_future_dates(&self, periods: usize) -> Vec<NaiveDate> {
        let mut dates = self.history_dates.clone();
        if let Some(&last) = self.history_dates.last() {
            dates.extend((1..=periods as u64).filter_map(|k| last.checked_add_days(Days::new(k))));
        }
        dates
    }

    pub fn predict(&self, dates: &[NaiveDate]) -> Vec<ForecastPoint> {
        dates
            .iter()
            .map(|&date| {
                let c = self.components(date);
                let scaled =
                    c.trend + c.yearly.unwrap_or(0.0) + c.weekly.unwrap_or(0.0);
                let spread = self.z * self.uncertainty(self.scaled_time(date));
                ForecastPoint {
                    date,
                    yhat: scaled * self.y_scale,
                    yhat_lower: (scaled - spread) * self.y_scale,
                    yhat_upper: (scaled + spread) * self.y_scale,
                    trend: c.trend * self.y_scale,
                    yearly: c.yearly.map(|v| v * self.y_scale),
                    weekly: c.weekly.map(|v| v * self.y_scale),
                }
            })
            .collect()
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn n_features(&self) -> usize {
        let mut p = 2 + self.changepoints.len();
        if self.yearly {
            p += 2 * self.settings.yearly_order;
        }
        if self.weekly {
            p += 2 * self.settings.weekly_order;
        }
        p
    }

    fn features(&self, date: NaiveDate) -> Vec<f64> {
        let t = self.scaled_time(date);
        let mut row = Vec::with_capacity(self.n_features());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
        let epoch_days = epoch_days(date);
        if self.yearly {
            row.extend(fourier(epoch_days, YEAR_DAYS, self.settings.yearly_order));
        }
        if self.weekly {
            row.extend(fourier(epoch_days, WEEK_DAYS, self.settings.weekly_order));
        }
        row
    }

    fn penalties(&self, noise_var: f64) -> Vec<f64> {
        let lambda = |scale: f64| (noise_var / (scale * scale)).max(RIDGE_FLOOR);
        let mut penalties = vec![lambda(BASE_PRIOR_SCALE); 2];
        penalties.extend(
            std::iter::repeat(lambda(self.settings.changepoint_prior_scale))
                .take(self.changepoints.len()),
        );
        penalties.resize(
            self.n_features(),
            lambda(self.settings.seasonality_prior_scale),
        );
        penalties
    }

    fn deltas<'a>(&self, beta: &'a DVector<f64>) -> &'a [f64] {
        &beta.as_slice()[2..2 + self.changepoints.len()]
    }

    fn components(&self, date: NaiveDate) -> Components {
        let row = self.features(date);
        let beta = self.beta.as_slice();
        let dot = |range: std::ops::Range<usize>| -> f64 {
            row[range.clone()]
                .iter()
                .zip(&beta[range])
                .map(|(x, b)| x * b)
                .sum()
        };

        let trend_end = 2 + self.changepoints.len();
        let mut offset = trend_end;
        let trend = dot(0..trend_end);
        let yearly = self.yearly.then(|| {
            let width = 2 * self.settings.yearly_order;
            let value = dot(offset..offset + width);
            offset += width;
            value
        });
        let weekly = self
            .weekly
            .then(|| dot(offset..offset + 2 * self.settings.weekly_order));
        Components {
            trend,
            yearly,
            weekly,
        }
    }

    /// Standard deviation (scaled units) at scaled time `t`. Past the end of
    /// history, future slope changes arrive at the historical changepoint rate
    /// with Laplace magnitudes of the fitted mean size.
    fn uncertainty(&self, t: f64) -> f64 {
        let h = (t - 1.0).max(0.0);
        let rate = self.changepoints.len() as f64;
        let trend_var = 2.0 * self.delta_scale.powi(2) * rate * h.powi(3) / 3.0;
        (self.sigma.powi(2) + trend_var).sqrt()
    }
}

/// Finite points sorted by date, last value wins on a repeated date.
fn clean(frame: &[TrainingPoint]) -> Vec<TrainingPoint> {
    let mut points: Vec<TrainingPoint> =
        frame.iter().copied().filter(|p| p.y.is_finite()).collect();
    points.sort_by_key(|p| p.ds);
    let mut out: Vec<TrainingPoint> = Vec::with_capacity(points.len());
    for point in points {
        match out.last_mut() {
            Some(last) if last.ds == point.ds => *last = point,
            _ => out.push(point),
        }
    }
    out
}

fn place_changepoints(ts: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let hist_size = ((ts.len() as f64) * range).floor() as usize;
    let count = requested.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let last = (hist_size - 1) as f64;
    (1..=count)
        .map(|k| ts[(k as f64 * last / count as f64).round() as usize])
        .collect()
}

fn epoch_days(date: NaiveDate) -> f64 {
    (date - NaiveDate::default()).num_days() as f64
}

fn fourier(days: f64, period: f64, order: usize) -> impl Iterator<Item = f64> {
    (1..=order).flat_map(move |n| {
        let angle = 2.0 * PI * n as f64 * days / period;
        [angle.sin(), angle.cos()]
    })
}

fn solve_ridge(x: &DMatrix<f64>, y: &DVector<f64>, penalties: &[f64]) -> Result<DVector<f64>> {
    let xt = x.transpose();
    let mut gram = &xt * x;
    for (j, lambda) in penalties.iter().enumerate() {
        gram[(j, j)] += lambda;
    }
    let rhs = &xt * y;
    let cholesky = gram
        .cholesky()
        .ok_or_else(|| DashboardError::Forecast("design matrix is not positive definite".into()))?;
    Ok(cholesky.solve(&rhs))
}

fn residual_variance(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    let residuals = y - x * beta;
    residuals.norm_squared() / y.len() as f64
}

fn normal_quantile(p: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| DashboardError::Forecast(e.to_string()))?;
    Ok(normal.inverse_cdf(p.clamp(0.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceBar;
    use chrono::{Datelike, Weekday};

    fn frame(start: NaiveDate, values: impl IntoIterator<Item = f64>) -> Vec<TrainingPoint> {
        values
            .into_iter()
            .enumerate()
            .map(|(i, y)| TrainingPoint {
                ds: start + Days::new(i as u64),
                y,
            })
            .collect()
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, day).unwrap()
    }

    fn fit(points: &[TrainingPoint]) -> FittedModel {
        AdditiveModel::new(ForecastSettings::default())
            .fit(points)
            .unwrap()
    }

    #[test]
    fn horizon_extends_history_by_period_days() {
        let points = frame(jan(3), (0..60).map(|i| 10.0 + 0.5 * i as f64));
        let model = fit(&points);
        let dates = model.make_future_dates(30);

        assert_eq!(dates.len(), 90);
        assert_eq!(dates[59], points[59].ds);
        assert_eq!(dates[89], points[59].ds + Days::new(30));
        assert!(dates.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(model.predict(&dates).len(), 90);
    }

    #[test]
    fn one_year_forecast_of_a_series() {
        let bars = (0..120)
            .map(|i| PriceBar {
                date: jan(1) + Days::new(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0 + i as f64 * 0.1,
                volume: 1_000,
            })
            .collect();
        let series = PriceSeries {
            ticker: "AAPL".into(),
            bars,
        };

        let out = forecast(&series, 1, &ForecastSettings::default()).unwrap();
        assert_eq!(out.ticker, "AAPL");
        assert_eq!(out.points.len(), 120 + 365);
        assert_eq!(
            out.points.last().unwrap().date,
            series.last_date().unwrap() + Days::new(365)
        );
    }

    #[test]
    fn linear_trend_is_extrapolated() {
        let points = frame(jan(1), (0..200).map(|i| 100.0 + 2.0 * i as f64));
        let model = fit(&points);
        let target = points[199].ds + Days::new(10);
        let predicted = model.predict(&[target])[0];

        assert!((predicted.yhat - 518.0).abs() < 1.0, "yhat = {}", predicted.yhat);
        assert!(predicted.yhat_lower <= predicted.yhat);
        assert!(predicted.yhat <= predicted.yhat_upper);
    }

    #[test]
    fn interval_widens_past_history_after_a_slope_change() {
        let points = frame(
            jan(1),
            (0..250).map(|i| {
                if i < 100 {
                    i as f64
                } else {
                    100.0 + 3.0 * (i - 100) as f64
                }
            }),
        );
        let model = fit(&points);
        assert!(model.changepoint_count() > 0);

        let last = points[249].ds;
        let near = model.predict(&[last + Days::new(5)])[0];
        let far = model.predict(&[last + Days::new(200)])[0];
        let width = |p: ForecastPoint| p.yhat_upper - p.yhat_lower;
        assert!(width(far) > width(near));
    }

    #[test]
    fn weekly_pattern_shows_up_in_weekly_component() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let points: Vec<_> = (0..140)
            .map(|i| {
                let ds = start + Days::new(i);
                let weekend = matches!(ds.weekday(), Weekday::Sat | Weekday::Sun);
                TrainingPoint {
                    ds,
                    y: 50.0 + if weekend { 5.0 } else { 0.0 },
                }
            })
            .collect();
        let model = fit(&points);
        assert!(model.has_weekly());
        assert!(!model.has_yearly());

        let saturday = NaiveDate::from_ymd_opt(2023, 5, 27).unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2023, 5, 24).unwrap();
        let out = model.predict(&[saturday, wednesday]);
        assert!(out[0].weekly.unwrap() > out[1].weekly.unwrap() + 3.0);
    }

    #[test]
    fn yearly_seasonality_needs_two_years() {
        let short = fit(&frame(jan(1), (0..400).map(|i| i as f64)));
        assert!(!short.has_yearly());
        let long = fit(&frame(jan(1), (0..800).map(|i| (i as f64 / 50.0).sin() + 10.0)));
        assert!(long.has_yearly());
    }

    #[test]
    fn too_little_history_is_a_forecast_failure() {
        let settings = ForecastSettings::default();
        let single = frame(jan(1), [10.0]);
        assert!(matches!(
            AdditiveModel::new(settings.clone()).fit(&single),
            Err(DashboardError::Forecast(_))
        ));

        let non_finite = frame(jan(1), [f64::NAN, 3.0, f64::INFINITY]);
        assert!(matches!(
            AdditiveModel::new(settings).fit(&non_finite),
            Err(DashboardError::Forecast(_))
        ));
    }

    #[test]
    fn changepoints_stay_in_leading_share_of_history() {
        let ts: Vec<f64> = (0..100).map(|i| i as f64 / 99.0).collect();
        let cps = place_changepoints(&ts, 25, 0.8);
        assert_eq!(cps.len(), 25);
        assert!(cps.iter().all(|&c| c > 0.0 && c <= 0.8));
        assert!(place_changepoints(&ts[..2], 25, 0.8).is_empty());
    }

    #[test]
    fn probit_matches_normal_quantiles() {
        assert!((normal_quantile(0.9).unwrap() - 1.281_551_6).abs() < 1e-6);
        assert!((normal_quantile(0.975).unwrap() - 1.959_964).abs() < 1e-6);
        assert!(normal_quantile(0.5).unwrap().abs() < 1e-9);
    }

    #[test]
    fn exact_fit_still_has_an_interval() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let points: Vec<_> = (0..120)
            .map(|i| start + Days::new(i))
            .filter(|ds| !matches!(ds.weekday(), Weekday::Sat | Weekday::Sun))
            .map(|ds| TrainingPoint { ds, y: 50.0 })
            .collect();
        let model = fit(&points);

        let last = points.last().unwrap().ds;
        let out = model.predict(&[points[10].ds, last + Days::new(30)]);
        for point in out {
            assert!(point.yhat_upper > point.yhat_lower, "{point:?}");
            assert!(point.yhat_lower <= point.yhat && point.yhat <= point.yhat_upper);
        }
    }
}
