//! Client runtime surface read by the probes.
//!
//! [`BrowserEnvironment`] is the boundary between the collection engine and
//! whatever hosts it (an embedded webview, a DevTools driver, a wasm bridge).
//! Every capability has a conservative default so a host only implements the
//! parts it can actually reach; anything left out reads as unsupported.

mod simulated;

pub use simulated::{ApiBehavior, ContentBlocker, NoiseTarget, SimulatedApi, SimulatedEnvironment};

use std::time::Duration;

use async_trait::async_trait;

use crate::collection::core::ProbeFault;

/// Opaque handle to an element created through the environment.
pub type NodeId = u64;

/// Navigator level attributes. Absent properties are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigatorInfo {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub languages: Option<Vec<String>>,
    pub cookie_enabled: bool,
    pub hardware_concurrency: Option<u32>,
    pub max_touch_points: Option<u32>,
    pub device_memory_gb: Option<f64>,
    pub bluetooth: bool,
    pub do_not_track: Option<String>,
    pub webdriver: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u32,
}

/// Network Information API snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    pub effective_type: Option<String>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Acos,
    Asin,
    Atan,
    Cos,
    Sin,
    Tan,
}

impl MathFunction {
    pub const ALL: [MathFunction; 6] = [
        MathFunction::Acos,
        MathFunction::Asin,
        MathFunction::Atan,
        MathFunction::Cos,
        MathFunction::Sin,
        MathFunction::Tan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MathFunction::Acos => "acos",
            MathFunction::Asin => "asin",
            MathFunction::Atan => "atan",
            MathFunction::Cos => "cos",
            MathFunction::Sin => "sin",
            MathFunction::Tan => "tan",
        }
    }

    pub fn apply(self, input: f64) -> f64 {
        match self {
            MathFunction::Acos => input.acos(),
            MathFunction::Asin => input.asin(),
            MathFunction::Atan => input.atan(),
            MathFunction::Cos => input.cos(),
            MathFunction::Sin => input.sin(),
            MathFunction::Tan => input.tan(),
        }
    }
}

/// Description of an element to insert into the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSpec {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
    pub styles: Vec<(String, String)>,
    pub text: Option<String>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn div() -> Self {
        Self::new("div")
    }

    /// Absolutely positioned far outside the viewport.
    pub fn off_screen(self) -> Self {
        self.with_style("position", "absolute")
            .with_style("left", "-9999px")
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.push((property.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn style(&self, property: &str) -> Option<&str> {
        self.styles
            .iter()
            .rev()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.as_str())
    }
}

/// Layout and computed style of a rendered element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementBox {
    pub width: f64,
    pub height: f64,
    pub display: String,
    pub visibility: String,
    pub background_color: String,
}

impl ElementBox {
    /// Whether something collapsed or hid the element.
    pub fn is_hidden(&self) -> bool {
        self.height == 0.0 || self.display == "none" || self.visibility == "hidden"
    }
}

/// 2D canvas drawing used by the canvas probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanvasScene {
    pub text: String,
    pub font: String,
    pub fills: Vec<String>,
}

impl Default for CanvasScene {
    fn default() -> Self {
        Self {
            text: "BrowserLeaks.com <canvas> 1.0".into(),
            font: "14px 'Arial'".into(),
            fills: vec!["#f60".into(), "#069".into(), "rgba(102, 204, 0, 0.7)".into()],
        }
    }
}

/// Offline audio graph: an oscillator feeding a dynamics compressor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorSpec {
    pub frequency_hz: f64,
    pub sample_rate: u32,
    pub length: usize,
}

impl Default for OscillatorSpec {
    fn default() -> Self {
        Self {
            frequency_hz: 10_000.0,
            sample_rate: 44_100,
            length: 44_100,
        }
    }
}

/// Reference WebGL scene rendered through a remotely loaded library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneSpec {
    pub library_url: String,
    pub material_color: u32,
    pub read_pixel: (u32, u32),
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            library_url: "https://cdnjs.cloudflare.com/ajax/libs/three.js/r128/three.min.js".into(),
            material_color: 0xff4422,
            read_pixel: (4, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaDeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuAdapter {
    pub supports_info: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterInfo {
    pub vendor: String,
    pub architecture: String,
    pub device: String,
    pub description: String,
}

/// Element that is detached when dropped, including when the owning future
/// is cancelled mid-way.
pub struct ScopedElement<'a> {
    env: &'a dyn BrowserEnvironment,
    node: NodeId,
}

impl<'a> ScopedElement<'a> {
    pub fn create(
        env: &'a dyn BrowserEnvironment,
        spec: &ElementSpec,
        parent: Option<NodeId>,
    ) -> Result<Self, ProbeFault> {
        let node = env.create_element(spec, parent)?;
        Ok(Self { env, node })
    }

    /// Take ownership of an element created elsewhere.
    pub fn adopt(env: &'a dyn BrowserEnvironment, node: NodeId) -> Self {
        Self { env, node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn measure(&self) -> Result<ElementBox, ProbeFault> {
        self.env.measure(self.node)
    }

    /// Keep the element attached and hand back its id.
    pub fn release(self) -> NodeId {
        let node = self.node;
        std::mem::forget(self);
        node
    }
}

impl Drop for ScopedElement<'_> {
    fn drop(&mut self) {
        if self.env.is_attached(self.node)
            && let Err(err) = self.env.remove_element(self.node)
        {
            log::debug!("failed to detach element {}: {err}", self.node);
        }
    }
}

/// Everything the probes can observe about the client runtime.
///
/// Implementations must not panic and should report missing capabilities as
/// [`ProbeFault::Unsupported`]. Asynchronous methods may take arbitrarily
/// long or never finish; callers bound them.
#[async_trait]
pub trait BrowserEnvironment: Send + Sync {
    fn navigator(&self) -> NavigatorInfo;

    fn screen(&self) -> Result<ScreenInfo, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    /// IANA time zone name.
    fn time_zone(&self) -> Result<String, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    fn timezone_offset_minutes(&self) -> i32 {
        0
    }

    fn connection(&self) -> Option<ConnectionInfo> {
        None
    }

    fn math(&self, function: MathFunction, input: f64) -> Result<f64, ProbeFault> {
        Ok(function.apply(input))
    }

    /// Unmasked WebGL renderer. `Ok(None)` when the debug extension is missing.
    fn webgl_unmasked_renderer(&self) -> Result<Option<String>, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    /// Insert an element under `parent`, or under the document body.
    fn create_element(
        &self,
        spec: &ElementSpec,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ProbeFault> {
        let _ = (spec, parent);
        Err(ProbeFault::Unsupported)
    }

    fn measure(&self, node: NodeId) -> Result<ElementBox, ProbeFault> {
        let _ = node;
        Err(ProbeFault::Unsupported)
    }

    /// Detach an element and its subtree.
    fn remove_element(&self, node: NodeId) -> Result<(), ProbeFault> {
        let _ = node;
        Err(ProbeFault::Unsupported)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let _ = node;
        false
    }

    /// Resolve after the next rendered frame.
    async fn next_frame(&self) {
        tokio::task::yield_now().await;
    }

    /// Draw `scene` and return the canvas as a data URL.
    async fn render_canvas(&self, scene: &CanvasScene) -> Result<String, ProbeFault> {
        let _ = scene;
        Err(ProbeFault::Unsupported)
    }

    /// Render the oscillator graph offline and return channel 0.
    async fn render_audio(&self, spec: &OscillatorSpec) -> Result<Vec<f32>, ProbeFault> {
        let _ = spec;
        Err(ProbeFault::Unsupported)
    }

    /// Ask for the current position; the host prompt gives up after `prompt_timeout`.
    async fn request_geolocation(&self, prompt_timeout: Duration) -> Result<(), ProbeFault> {
        let _ = prompt_timeout;
        Err(ProbeFault::Unsupported)
    }

    async fn battery(&self) -> Result<BatteryStatus, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    async fn media_devices(&self) -> Result<Vec<MediaDeviceKind>, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    fn speech_voice_count(&self) -> Result<usize, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    /// Append a `<script>` element and resolve once it loaded.
    async fn load_script(&self, url: &str) -> Result<NodeId, ProbeFault> {
        let _ = url;
        Err(ProbeFault::Unsupported)
    }

    /// Render `scene` with the loaded library and read back one RGBA pixel.
    fn render_reference_scene(&self, scene: &SceneSpec) -> Result<[u8; 4], ProbeFault> {
        let _ = scene;
        Err(ProbeFault::Unsupported)
    }

    async fn request_gpu_adapter(&self) -> Result<Option<GpuAdapter>, ProbeFault> {
        Err(ProbeFault::Unsupported)
    }

    async fn gpu_adapter_info(&self, adapter: &GpuAdapter) -> Result<Option<AdapterInfo>, ProbeFault> {
        let _ = adapter;
        Err(ProbeFault::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Headless;

    impl BrowserEnvironment for Headless {
        fn navigator(&self) -> NavigatorInfo {
            NavigatorInfo::default()
        }
    }

    #[tokio::test]
    async fn missing_capabilities_read_as_unsupported() {
        let env = Headless;
        assert_eq!(env.screen(), Err(ProbeFault::Unsupported));
        assert_eq!(env.battery().await, Err(ProbeFault::Unsupported));
        assert_eq!(
            env.create_element(&ElementSpec::div(), None),
            Err(ProbeFault::Unsupported)
        );
        assert!(env.math(MathFunction::Cos, 0.5).is_ok());
    }

    #[test]
    fn scoped_elements_detach_on_drop() {
        let env = SimulatedEnvironment::desktop_chrome();
        let container = ScopedElement::create(&env, &ElementSpec::div(), None).unwrap();
        ScopedElement::create(&env, &ElementSpec::div(), Some(container.node()))
            .map(ScopedElement::release)
            .unwrap();
        assert_eq!(env.attached_elements(), 2);
        drop(container);
        assert_eq!(env.attached_elements(), 0);
    }

    #[test]
    fn later_styles_override_earlier_ones() {
        let spec = ElementSpec::div()
            .off_screen()
            .with_style("left", "0px");
        assert_eq!(spec.style("left"), Some("0px"));
        assert_eq!(spec.style("position"), Some("absolute"));
    }
}
