use crate::domain::data_format::{ByteOrder, DataFormat};
use crate::domain::template::{Template, TemplateError};
use crate::domain::{Value, ValueType};
use crate::instrument::{Idn, InstrumentError, InstrumentOptions, Ints, MessageResource, Numbers, Parameter, ParameterError, Validator, ValidatorError, VisaInstrument};
use crate::resource_manager::ResourceManager;
use crate::session::Session;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, instrument};

const MIN_FREQUENCY: f64 = 2.0;
const MAX_FREQUENCY: f64 = 26.5e9;
const MAX_POINTS: i64 = 100_001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementMode {
    SpectrumAnalysis,
    PhaseNoise,
}

impl MeasurementMode {
    pub const ALL: [MeasurementMode; 2] = [MeasurementMode::SpectrumAnalysis, MeasurementMode::PhaseNoise];

    fn id(&self) -> &'static str {
        match self {
            MeasurementMode::SpectrumAnalysis => "SA",
            MeasurementMode::PhaseNoise => "PN",
        }
    }

    fn parameter(&self, name: &str) -> String {
        format!("{}_{}", self.id().to_lowercase(), name)
    }
}

impl Display for MeasurementMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for MeasurementMode {
    type Err = SpectrumAnalyzerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SA" => Ok(MeasurementMode::SpectrumAnalysis),
            "PN" => Ok(MeasurementMode::PhaseNoise),
            _ => Err(SpectrumAnalyzerError::UnknownMode(s.to_string())),
        }
    }
}

/// Driver for a swept spectrum analyzer with a spectrum analysis and a phase noise mode.
///
/// Frequencies and point counts are kept per mode; the trace is always transferred as a little endian
/// `REAL,64` block.
#[derive(Debug)]
pub struct SpectrumAnalyzer<R: MessageResource> {
    instrument: VisaInstrument<R>,
}

impl SpectrumAnalyzer<Session> {
    pub async fn connect(manager: &ResourceManager, address: &str) -> Result<Self, SpectrumAnalyzerError> {
        let instrument = VisaInstrument::connect("spectrum_analyzer", manager, address, InstrumentOptions::default()).await?;
        SpectrumAnalyzer::new(instrument)
    }
}

impl<R: MessageResource> SpectrumAnalyzer<R> {
    pub fn new(mut instrument: VisaInstrument<R>) -> Result<Self, SpectrumAnalyzerError> {
        let frequency = || Numbers::new(Some(MIN_FREQUENCY), Some(MAX_FREQUENCY)).map(Validator::Numbers);

        instrument.add_parameter(
            Parameter::builder("mode", ValueType::Str)
                .label("Measurement mode")
                .get_cmd(Template::parse("INST:SEL?")?)
                .set_cmd(Template::parse("INST:SEL {}")?)
                .validator(Validator::one_of(MeasurementMode::ALL.iter().map(|m| Value::Str(m.to_string())).collect())?)
                .build()?,
        )?;
        instrument.add_parameter(
            Parameter::builder("continuous", ValueType::Bool)
                .label("Continuous sweep")
                .get_cmd(Template::parse("INIT:CONT?")?)
                .set_cmd(Template::parse("INIT:CONT {:d}")?)
                .build()?,
        )?;
        instrument.add_parameter(
            Parameter::builder("averages", ValueType::Int)
                .label("Average count")
                .get_cmd(Template::parse("SENS:AVER:COUN?")?)
                .set_cmd(Template::parse("SENS:AVER:COUN {:d}")?)
                .validator(Validator::Ints(Ints::new(Some(1), Some(10_000))?))
                .build()?,
        )?;

        for mode in MeasurementMode::ALL {
            instrument.add_parameter(
                Parameter::builder(&mode.parameter("start"), ValueType::Float)
                    .label(&format!("{} start frequency", mode))
                    .unit("Hz")
                    .get_cmd(Template::parse(&format!("SENS:{}:FREQ:STAR?", mode))?)
                    .set_cmd(Template::parse(&format!("SENS:{}:FREQ:STAR {{:.6e}}", mode))?)
                    .validator(frequency()?)
                    .build()?,
            )?;
            instrument.add_parameter(
                Parameter::builder(&mode.parameter("stop"), ValueType::Float)
                    .label(&format!("{} stop frequency", mode))
                    .unit("Hz")
                    .get_cmd(Template::parse(&format!("SENS:{}:FREQ:STOP?", mode))?)
                    .set_cmd(Template::parse(&format!("SENS:{}:FREQ:STOP {{:.6e}}", mode))?)
                    .validator(frequency()?)
                    .build()?,
            )?;
            instrument.add_parameter(
                Parameter::builder(&mode.parameter("npts"), ValueType::Int)
                    .label(&format!("{} sweep points", mode))
                    .get_cmd(Template::parse(&format!("SENS:{}:SWE:POIN?", mode))?)
                    .set_cmd(Template::parse(&format!("SENS:{}:SWE:POIN {{:d}}", mode))?)
                    .validator(Validator::Ints(Ints::new(Some(1), Some(MAX_POINTS))?))
                    .build()?,
            )?;
        }

        Ok(SpectrumAnalyzer { instrument })
    }

    pub fn instrument(&mut self) -> &mut VisaInstrument<R> {
        &mut self.instrument
    }

    pub async fn idn(&mut self) -> Result<Idn, SpectrumAnalyzerError> {
        Ok(self.instrument.get_idn().await?)
    }

    pub async fn mode(&mut self) -> Result<MeasurementMode, SpectrumAnalyzerError> {
        match self.instrument.get("mode").await? {
            Value::Str(mode) => mode.parse(),
            other => Err(SpectrumAnalyzerError::UnexpectedReply(other.to_string())),
        }
    }

    #[instrument(skip(self))]
    pub async fn select_mode(&mut self, mode: MeasurementMode) -> Result<(), SpectrumAnalyzerError> {
        self.instrument.set("mode", Value::Str(mode.to_string())).await?;
        info!("📡 Selected mode {}", mode);
        Ok(())
    }

    pub async fn start(&mut self, mode: MeasurementMode) -> Result<f64, SpectrumAnalyzerError> {
        self.float(&mode.parameter("start")).await
    }

    pub async fn stop(&mut self, mode: MeasurementMode) -> Result<f64, SpectrumAnalyzerError> {
        self.float(&mode.parameter("stop")).await
    }

    /// Sets start and stop, the analyzer keeps `start < stop` in every mode. Nothing is written unless both are valid.
    #[instrument(skip(self))]
    pub async fn set_span(&mut self, mode: MeasurementMode, start: f64, stop: f64) -> Result<(), SpectrumAnalyzerError> {
        if start >= stop {
            return Err(SpectrumAnalyzerError::InvalidSpan { start, stop });
        }
        let (start_name, stop_name) = (mode.parameter("start"), mode.parameter("stop"));
        self.instrument.validate(&start_name, Value::Float(start))?;
        self.instrument.validate(&stop_name, Value::Float(stop))?;

        self.instrument.set(&start_name, Value::Float(start)).await?;
        self.instrument.set(&stop_name, Value::Float(stop)).await?;
        Ok(())
    }

    pub async fn npts(&mut self, mode: MeasurementMode) -> Result<i64, SpectrumAnalyzerError> {
        match self.instrument.get(&mode.parameter("npts")).await? {
            Value::Int(npts) => Ok(npts),
            other => Err(SpectrumAnalyzerError::UnexpectedReply(other.to_string())),
        }
    }

    pub async fn set_npts(&mut self, mode: MeasurementMode, npts: i64) -> Result<(), SpectrumAnalyzerError> {
        self.instrument.set(&mode.parameter("npts"), Value::Int(npts)).await?;
        Ok(())
    }

    pub async fn set_continuous(&mut self, continuous: bool) -> Result<(), SpectrumAnalyzerError> {
        self.instrument.set("continuous", Value::Bool(continuous)).await?;
        Ok(())
    }

    /// Downloads the trace of the last sweep as a binary block.
    #[instrument(skip(self))]
    pub async fn trace(&mut self) -> Result<Vec<f64>, SpectrumAnalyzerError> {
        self.instrument.write("FORM REAL,64").await?;
        let trace = self
            .instrument
            .resource_mut()
            .query_binary_values("TRAC:DATA?", DataFormat::Real64, ByteOrder::Little)
            .await
            .map_err(InstrumentError::from)?;
        info!("📈 Read a trace of {} point(s)", trace.len());
        Ok(trace)
    }

    /// Single sweep: stops continuous sweeping, triggers and waits for completion.
    pub async fn sweep(&mut self) -> Result<Vec<f64>, SpectrumAnalyzerError> {
        self.set_continuous(false).await?;
        self.instrument.write("INIT:IMM").await?;
        let done = self.instrument.ask("*OPC?").await?;
        if done.trim() != "1" {
            return Err(SpectrumAnalyzerError::UnexpectedReply(done));
        }
        self.trace().await
    }

    pub async fn reset(&mut self) -> Result<(), SpectrumAnalyzerError> {
        self.instrument.write("*RST").await?;
        info!("🔄 Reset '{}'", self.instrument.name());
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), SpectrumAnalyzerError> {
        Ok(self.instrument.close().await?)
    }

    async fn float(&mut self, name: &str) -> Result<f64, SpectrumAnalyzerError> {
        let value = self.instrument.get(name).await?;
        value.as_f64().ok_or_else(|| SpectrumAnalyzerError::UnexpectedReply(value.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum SpectrumAnalyzerError {
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error("unknown measurement mode '{0}'")]
    UnknownMode(String),
    #[error("start {start} must be below stop {stop}")]
    InvalidSpan { start: f64, stop: f64 },
    #[error("unexpected reply '{0}'")]
    UnexpectedReply(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::property::OutOfRangePolicy;
    use crate::fixture_loader::from_yaml;
    use crate::store::StoreOptions;
    use pretty_assertions::assert_eq;
    use test_log::test;

    async fn analyzer() -> SpectrumAnalyzer<Session> {
        let fixture = from_yaml(include_str!("../../sims/spectrum_analyzer.yaml"), OutOfRangePolicy::Reject).unwrap();
        let manager = ResourceManager::spawn(&[fixture], StoreOptions::default(), 8);
        SpectrumAnalyzer::connect(&manager, "GPIB::18::INSTR").await.unwrap()
    }

    #[test(tokio::test)]
    async fn identifies_itself() {
        let idn = analyzer().await.idn().await.unwrap();

        assert_eq!(idn.vendor.as_deref(), Some("Simulated Instruments"));
        assert_eq!(idn.model.as_deref(), Some("SA-9030"));
    }

    #[test(tokio::test)]
    async fn switches_between_measurement_modes() {
        let mut analyzer = analyzer().await;
        assert_eq!(analyzer.mode().await.unwrap(), MeasurementMode::SpectrumAnalysis);

        analyzer.select_mode(MeasurementMode::PhaseNoise).await.unwrap();

        assert_eq!(analyzer.mode().await.unwrap(), MeasurementMode::PhaseNoise);
    }

    #[test(tokio::test)]
    async fn keeps_the_span_of_each_mode_separately() {
        let mut analyzer = analyzer().await;

        analyzer.set_span(MeasurementMode::PhaseNoise, 1e6, 2e6).await.unwrap();
        analyzer.set_npts(MeasurementMode::PhaseNoise, 201).await.unwrap();

        assert_eq!(analyzer.start(MeasurementMode::PhaseNoise).await.unwrap(), 1e6);
        assert_eq!(analyzer.stop(MeasurementMode::PhaseNoise).await.unwrap(), 2e6);
        assert_eq!(analyzer.npts(MeasurementMode::PhaseNoise).await.unwrap(), 201);
        assert_eq!(analyzer.start(MeasurementMode::SpectrumAnalysis).await.unwrap(), 10.0);
        assert_eq!(analyzer.npts(MeasurementMode::SpectrumAnalysis).await.unwrap(), 1001);
    }

    #[test(tokio::test)]
    async fn refuses_invalid_spans_and_point_counts() {
        let mut analyzer = analyzer().await;

        assert!(matches!(
            analyzer.set_span(MeasurementMode::SpectrumAnalysis, 2e6, 1e6).await,
            Err(SpectrumAnalyzerError::InvalidSpan { .. })
        ));
        assert!(matches!(
            analyzer.set_span(MeasurementMode::SpectrumAnalysis, 1e6, 30e9).await,
            Err(SpectrumAnalyzerError::Instrument(InstrumentError::Parameter { .. }))
        ));
        assert_eq!(analyzer.start(MeasurementMode::SpectrumAnalysis).await.unwrap(), 10.0);
        assert_eq!(analyzer.stop(MeasurementMode::SpectrumAnalysis).await.unwrap(), 26.5e9);
        assert!(analyzer.set_npts(MeasurementMode::SpectrumAnalysis, 0).await.is_err());
    }

    #[test(tokio::test)]
    async fn downloads_the_trace_as_a_binary_block() {
        let mut analyzer = analyzer().await;

        let trace = analyzer.sweep().await.unwrap();

        assert_eq!(trace.len(), 11);
        assert_eq!(trace[0], -91.25);
        assert_eq!(analyzer.instrument().ask("FORM?").await.unwrap(), "REAL,64");
    }

    #[test(tokio::test)]
    async fn reset_restores_the_defaults() {
        let mut analyzer = analyzer().await;
        analyzer.select_mode(MeasurementMode::PhaseNoise).await.unwrap();
        analyzer.set_npts(MeasurementMode::SpectrumAnalysis, 11).await.unwrap();

        analyzer.reset().await.unwrap();

        assert_eq!(analyzer.mode().await.unwrap(), MeasurementMode::SpectrumAnalysis);
        assert_eq!(analyzer.npts(MeasurementMode::SpectrumAnalysis).await.unwrap(), 1001);
        assert_eq!(analyzer.instrument().ask("FORM?").await.unwrap(), "ASC,8");
    }

    #[test(tokio::test)]
    async fn snapshot_lists_every_parameter() {
        let mut analyzer = analyzer().await;

        let snapshot = analyzer.instrument().snapshot(true).await.unwrap();

        assert_eq!(snapshot["parameters"]["pn_npts"]["value"], serde_json::json!(1001));
        assert_eq!(snapshot["parameters"]["continuous"]["value"], serde_json::json!(true));
        assert_eq!(snapshot["parameters"]["mode"]["vals"], serde_json::json!("<Enum: {SA, PN}>"));
    }
}
