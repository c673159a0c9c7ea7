use crate::{
    config::FilmConfig,
    error::Result,
    pipeline::{
        stages::{CleanupStage, HalftoneStage, StrokeStage, TrapStage},
        FilmPipeline,
    },
    traits::FilmStage,
};

/// Builder for film pipelines with a fluent API
pub struct FilmPipelineBuilder {
    config: FilmConfig,
    stages: Vec<Box<dyn FilmStage>>,
    default_stages: bool,
}

impl Default for FilmPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilmPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: FilmConfig::default(),
            stages: Vec::new(),
            default_stages: true,
        }
    }

    /// Use this configuration (replaces any earlier one)
    pub fn with_config(mut self, config: FilmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn colors(mut self, colors: usize) -> Self {
        self.config.quantization.colors = colors;
        self
    }

    pub fn dpi(mut self, dpi: f32) -> Self {
        self.config.dpi = dpi;
        self
    }

    /// Append a stage after the ones derived from the configuration
    pub fn add_stage<S>(mut self, stage: S) -> Self
    where
        S: FilmStage + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    /// Run only the stages added with [`Self::add_stage`]
    pub fn without_default_stages(mut self) -> Self {
        self.default_stages = false;
        self
    }

    fn config_stages(config: &FilmConfig) -> Vec<Box<dyn FilmStage>> {
        let mut stages: Vec<Box<dyn FilmStage>> = Vec::new();
        if config.cleanup.enabled {
            stages.push(Box::new(CleanupStage::new(config.cleanup.clone())));
        }
        if config.trap.expand_px > 0 || config.trap.shrink_px > 0 {
            stages.push(Box::new(TrapStage::new(config.trap.clone())));
        }
        if config.stroke.validate || config.stroke.auto_thicken {
            stages.push(Box::new(StrokeStage::new(config.stroke.clone())));
        }
        if config.halftone.enabled {
            stages.push(Box::new(HalftoneStage::new(config.halftone.clone())));
        }
        stages
    }

    /// Validate the configuration and assemble the pipeline
    pub fn build(self) -> Result<FilmPipeline> {
        let advisories = self.config.validate()?;

        let mut stages = if self.default_stages {
            Self::config_stages(&self.config)
        } else {
            Vec::new()
        };
        stages.extend(self.stages);

        Ok(FilmPipeline::new(self.config, stages, advisories))
    }
}
