//! Module for visualizing backtest results and candle charts.

use std::path::{Path, PathBuf};

use plotters::backend::{BitMapBackend, DrawingBackend, SVGBackend};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::WHITE;

use crate::engine::{Backtest, Candle, PositionType, Trade};
use crate::errors::{Error, Result};

/// Aspect ratio for the generated charts.
const ASPECT_RATIO: f64 = 0.5625;
/// Size of the X-axis labels.
const X_LABEL_SIZE: i32 = 20;
/// Size of the Y-axis labels.
const Y_LABEL_SIZE: i32 = 20;

/// Output formats for the generated charts with output filename.
#[derive(Debug, Clone)]
pub enum DrawOutput {
    /// Save to the output SVG file.
    Svg(PathBuf),
    /// Save to the output PNG file.
    Png(PathBuf),
}

impl DrawOutput {
    /// Picks the format from the file extension: `.png` is PNG, anything else SVG.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => Self::Png(path),
            _ => Self::Svg(path),
        }
    }
}

impl Default for DrawOutput {
    fn default() -> Self {
        Self::Svg(PathBuf::from("backtest.svg"))
    }
}

/// Configuration options for chart generation.
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    /// Chart title.
    title: Option<String>,
    /// Output format and path.
    output: DrawOutput,
    /// Whether to show the volume chart.
    show_volume: bool,
    /// Whether to show the equity chart.
    show_equity: bool,
}

impl DrawOptions {
    /// Sets the chart title.
    pub fn title(mut self, title: impl ToString) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the output format and path.
    pub fn draw_output(mut self, output: DrawOutput) -> Self {
        self.output = output;
        self
    }

    /// Enables or disables the volume chart.
    pub fn show_volume(mut self, show: bool) -> Self {
        self.show_volume = show;
        self
    }

    /// Enables or disables the equity chart.
    pub fn show_equity(mut self, show: bool) -> Self {
        self.show_equity = show;
        self
    }
}

/// Chart drawing utility for backtest visualization.
///
/// The x axis is the candle index, since timestamps are optional.
pub struct Draw<'d> {
    backtest: &'d Backtest,
    options: DrawOptions,
}

impl<'d> Draw<'d> {
    /// Creates a new `Draw` instance with the given backtest.
    pub fn with_backtest(backtest: &'d Backtest) -> Self {
        Self {
            backtest,
            options: DrawOptions::default(),
        }
    }

    /// Sets the drawing options.
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }

    /// Generates and saves the chart based on the configured options.
    pub fn plot(&self) -> Result<()> {
        let candle_count = self.backtest.data().len() as u32;
        let mut height_factor = 1.0;
        if self.options.show_volume {
            height_factor += 0.3;
        }
        if self.options.show_equity {
            height_factor += 0.4;
        }
        let width = 1280.max(10 * candle_count);
        let height = ((width as f64 * ASPECT_RATIO * height_factor) as u32).min(1200);

        match &self.options.output {
            DrawOutput::Svg(path) => self.plot_svg(path, width, height),
            DrawOutput::Png(path) => self.plot_png(path, width, height),
        }
    }

    /// Saves the chart as an SVG file.
    fn plot_svg(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        let root = SVGBackend::new(path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| Error::Plotters(e.to_string()))?;
        self.draw_chart(&root)
    }

    /// Saves the chart as a PNG file.
    fn plot_png(&self, path: &Path, width: u32, height: u32) -> Result<()> {
        let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| Error::Plotters(e.to_string()))?;
        self.draw_chart(&root)
    }

    /// Splits the area and draws every enabled chart.
    fn draw_chart<DB: DrawingBackend>(&self, drawing_area: &DrawingArea<DB, Shift>) -> Result<()> {
        let total_height = drawing_area.dim_in_pixel().1 as f64;
        let volume_height = if self.options.show_volume { total_height * 0.2 } else { 0.0 };
        let equity_height = if self.options.show_equity { total_height * 0.25 } else { 0.0 };
        let price_height = total_height - volume_height - equity_height;

        let (price_area, rest_area) = drawing_area.split_vertically(price_height as u32);
        let (volume_area, equity_area) = rest_area.split_vertically(volume_height as u32);

        let candles = self.backtest.data().candles();
        self.draw_price_chart(&price_area, candles)?;
        if self.options.show_volume {
            self.draw_volume_chart(&volume_area, candles)?;
        }
        if self.options.show_equity {
            self.draw_equity_chart(&equity_area)?;
        }

        drawing_area.present().map_err(|e| Error::Plotters(e.to_string()))
    }

    /// Draws the price chart (candlesticks) and the fills.
    fn draw_price_chart<DB: DrawingBackend>(&self, drawing_area: &DrawingArea<DB, Shift>, candles: &[Candle]) -> Result<()> {
        let min_price = candles.iter().map(Candle::low).fold(f64::INFINITY, f64::min);
        let max_price = candles.iter().map(Candle::high).fold(f64::NEG_INFINITY, f64::max);
        let price_padding = ((max_price - min_price) * 0.1).max(1e-6);
        let title = self.options.title.as_deref().unwrap_or("Backtest");

        let drawing_area = drawing_area.margin(10, 10, 70, 70);
        let mut chart = ChartBuilder::on(&drawing_area)
            .caption(title, ("sans-serif", 30).into_font())
            .x_label_area_size(X_LABEL_SIZE)
            .y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(0..candles.len(), min_price - price_padding..max_price + price_padding)
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .configure_mesh()
            .y_desc("Price")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .y_labels(5)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        let candle_width = {
            let total_width = drawing_area.dim_in_pixel().0 as f64;
            let available_width = total_width - (X_LABEL_SIZE * 2) as f64;
            (available_width / candles.len() as f64 * 0.7).max(1.0) as u32
        };

        chart
            .draw_series(candles.iter().enumerate().map(|(i, c)| {
                let color = if c.close() >= c.open() { GREEN.filled() } else { RED.filled() };
                CandleStick::new(i, c.open(), c.high(), c.low(), c.close(), color, color, candle_width)
            }))
            .map_err(|e| Error::Plotters(e.to_string()))?;

        //? opens in blue, closes in black, shorts hollow
        chart
            .draw_series(self.backtest.trades().iter().map(|trade| {
                let color = if matches!(trade, Trade::Open { .. }) { BLUE } else { BLACK };
                let style = match trade.position_type() {
                    PositionType::Long => color.filled(),
                    PositionType::Short => color.stroke_width(2),
                };
                Circle::new((trade.index(), trade.price()), 4, style)
            }))
            .map_err(|e| Error::Plotters(e.to_string()))?;

        Ok(())
    }

    /// Draws the volume chart.
    fn draw_volume_chart<DB: DrawingBackend>(&self, drawing_area: &DrawingArea<DB, Shift>, candles: &[Candle]) -> Result<()> {
        let max_volume = candles
            .iter()
            .filter_map(Candle::volume)
            .fold(0.0, f64::max)
            .max(1.0);
        let drawing_area = drawing_area.margin(0, 10, 70, 70);

        let mut chart = ChartBuilder::on(&drawing_area)
            .x_label_area_size(X_LABEL_SIZE)
            .y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(0..candles.len(), 0.0..max_volume * 1.1)
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .configure_mesh()
            .y_desc("Volume")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .y_labels(3)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .draw_series(candles.iter().enumerate().map(|(i, c)| {
                let color = if c.close() >= c.open() { GREEN.mix(0.3) } else { RED.mix(0.3) };
                Rectangle::new([(i, 0.0), (i + 1, c.volume().unwrap_or(0.0))], color.filled())
            }))
            .map(|_| ())
            .map_err(|e| Error::Plotters(e.to_string()))
    }

    /// Draws the equity after every candle against the initial cash.
    fn draw_equity_chart<DB: DrawingBackend>(&self, drawing_area: &DrawingArea<DB, Shift>) -> Result<()> {
        let equity = &self.backtest.equity_series()[1..];
        let initial = self.backtest.initial_cash();
        let min_equity = equity.iter().copied().fold(initial, f64::min);
        let max_equity = equity.iter().copied().fold(initial, f64::max);
        let padding = ((max_equity - min_equity) * 0.1).max(1e-6);
        let drawing_area = drawing_area.margin(10, 10, 70, 70);

        let mut chart = ChartBuilder::on(&drawing_area)
            .x_label_area_size(X_LABEL_SIZE)
            .y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(0..equity.len(), min_equity - padding..max_equity + padding)
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .configure_mesh()
            .x_desc("Candle")
            .y_desc("Equity")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .y_labels(4)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .draw_series(LineSeries::new(
                [(0, initial), (equity.len(), initial)],
                BLACK.mix(0.4),
            ))
            .map_err(|e| Error::Plotters(e.to_string()))?;
        chart
            .draw_series(LineSeries::new(equity.iter().copied().enumerate(), BLUE))
            .map(|_| ())
            .map_err(|e| Error::Plotters(e.to_string()))
    }
}

#[cfg(test)]
#[test]
fn output_from_extension() {
    assert!(matches!(DrawOutput::from_path("chart.PNG"), DrawOutput::Png(_)));
    assert!(matches!(DrawOutput::from_path("chart.svg"), DrawOutput::Svg(_)));
    assert!(matches!(DrawOutput::from_path("chart"), DrawOutput::Svg(_)));
}
