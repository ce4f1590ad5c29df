//! Graphics and audio stack probes.

use std::time::Duration;

use async_trait::async_trait;

use crate::collection::core::{ProbeFault, Reading, TimeoutGuard, keys};
use crate::config::ProbeBudgets;
use crate::environment::{
    BrowserEnvironment, CanvasScene, OscillatorSpec, SceneSpec, ScopedElement,
};

use super::{FnProbe, SETTLE_GRACE, SuspendingProbe};

pub fn webgl_renderer_probe() -> FnProbe {
    FnProbe::keyed(keys::WEBGL_RENDERER, |env| match env.webgl_unmasked_renderer() {
        Ok(Some(renderer)) => Reading::value(renderer),
        // Context exists but the debug extension is hidden.
        Ok(None) => Reading::fault(ProbeFault::Empty),
        Err(fault) => Reading::fault(fault),
    })
}

/// Data URL of a fixed 2D drawing.
#[derive(Debug, Clone, Default)]
pub struct CanvasProbe {
    scene: CanvasScene,
}

#[async_trait]
impl SuspendingProbe for CanvasProbe {
    fn name(&self) -> &'static str {
        keys::noise::CANVAS
    }

    fn key(&self) -> &'static str {
        keys::CANVAS
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        match env.render_canvas(&self.scene).await {
            Ok(url) if url.is_empty() => Reading::fault(ProbeFault::Empty),
            other => other.into(),
        }
    }
}

/// Sum of absolute sample values of an offline-rendered oscillator.
#[derive(Debug, Clone, Default)]
pub struct AudioProbe {
    spec: OscillatorSpec,
}

#[async_trait]
impl SuspendingProbe for AudioProbe {
    fn name(&self) -> &'static str {
        keys::noise::AUDIO
    }

    fn key(&self) -> &'static str {
        keys::AUDIO
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        match env.render_audio(&self.spec).await {
            Ok(samples) if samples.is_empty() => Reading::fault(ProbeFault::Empty),
            Ok(samples) => {
                let sum: f64 = samples.iter().map(|s| f64::from(s.abs())).sum();
                Reading::value(sum)
            }
            Err(fault) => Reading::fault(fault),
        }
    }
}

/// Renders a reference scene through a remotely loaded WebGL library and
/// reads back one pixel.
#[derive(Debug, Clone)]
pub struct WebGlSceneProbe {
    scene: SceneSpec,
    load_bound: Duration,
}

impl Default for WebGlSceneProbe {
    fn default() -> Self {
        Self::new(ProbeBudgets::default().script_load())
    }
}

impl WebGlSceneProbe {
    pub fn new(load_bound: Duration) -> Self {
        Self {
            scene: SceneSpec::default(),
            load_bound,
        }
    }
}

#[async_trait]
impl SuspendingProbe for WebGlSceneProbe {
    fn name(&self) -> &'static str {
        keys::WEBGL_SCENE
    }

    fn key(&self) -> &'static str {
        keys::WEBGL_SCENE
    }

    fn budget(&self, budgets: &ProbeBudgets) -> Duration {
        budgets.script_load() + SETTLE_GRACE
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        let loaded = TimeoutGuard::new(self.load_bound)
            .run(env.load_script(&self.scene.library_url), Err(ProbeFault::Timeout))
            .await
            .into_inner();
        let script = match loaded {
            Ok(node) => ScopedElement::adopt(env, node),
            Err(fault) => return Reading::fault(fault),
        };

        let pixel = env.render_reference_scene(&self.scene);
        drop(script);

        pixel
            .map(|[r, g, b, a]| format!("[{r},{g},{b},{a}]"))
            .into()
    }
}

/// WebGPU adapter description. Both the adapter and its info request get
/// their own bound.
#[derive(Debug, Clone, Copy)]
pub struct WebGpuProbe {
    step_bound: Duration,
}

impl Default for WebGpuProbe {
    fn default() -> Self {
        Self::new(ProbeBudgets::default().default_bound())
    }
}

impl WebGpuProbe {
    pub fn new(step_bound: Duration) -> Self {
        Self { step_bound }
    }
}

#[async_trait]
impl SuspendingProbe for WebGpuProbe {
    fn name(&self) -> &'static str {
        keys::WEBGPU_ADAPTER
    }

    fn key(&self) -> &'static str {
        keys::WEBGPU_ADAPTER
    }

    fn budget(&self, budgets: &ProbeBudgets) -> Duration {
        budgets.default_bound() * 2 + SETTLE_GRACE
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        let adapter = TimeoutGuard::new(self.step_bound)
            .run(env.request_gpu_adapter(), Err(ProbeFault::Timeout))
            .await
            .into_inner();
        let adapter = match adapter {
            Ok(Some(adapter)) => adapter,
            Ok(None) => return Reading::fault(ProbeFault::failed("no adapter")),
            Err(fault) => return Reading::fault(fault),
        };
        if !adapter.supports_info {
            return Reading::value("available");
        }

        let info = TimeoutGuard::new(self.step_bound)
            .run(env.gpu_adapter_info(&adapter), Err(ProbeFault::Timeout))
            .await
            .into_inner();
        let info = match info {
            Ok(Some(info)) => info,
            Ok(None) => return Reading::fault(ProbeFault::Empty),
            Err(fault) => return Reading::fault(fault),
        };

        let description = [info.vendor, info.architecture, info.device, info.description]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        if description.is_empty() {
            Reading::fault(ProbeFault::Empty)
        } else {
            Reading::value(description)
        }
    }
}
