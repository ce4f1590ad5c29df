//! Immediate probes over navigator, screen, locale and network attributes.

use crate::collection::core::{ProbeFault, Reading, keys};
use crate::environment::{BrowserEnvironment, MathFunction};

use super::FnProbe;

/// Argument every math function is evaluated at.
pub const MATH_INPUT: f64 = 0.5;

/// Every probe in this module, in registry order.
pub fn probes() -> Vec<FnProbe> {
    vec![
        FnProbe::keyed(keys::USER_AGENT, user_agent),
        FnProbe::keyed(keys::TIMEZONE, time_zone),
        FnProbe::keyed(keys::TIMEZONE_OFFSET, timezone_offset),
        FnProbe::keyed(keys::LANGUAGE, language),
        FnProbe::keyed(keys::LANGUAGES, languages),
        FnProbe::keyed(keys::SCREEN_RESOLUTION, screen_resolution),
        FnProbe::keyed(keys::AVAILABLE_SCREEN, available_screen),
        FnProbe::keyed(keys::COLOR_DEPTH, color_depth),
        FnProbe::keyed(keys::COOKIES_ENABLED, cookies_enabled),
        FnProbe::keyed(keys::HARDWARE_CONCURRENCY, hardware_concurrency),
        FnProbe::keyed(keys::MAX_TOUCH_POINTS, max_touch_points),
        FnProbe::keyed(keys::DEVICE_MEMORY, device_memory),
        FnProbe::keyed(keys::BLUETOOTH, bluetooth),
        FnProbe::keyed(keys::EFFECTIVE_NETWORK_TYPE, effective_network_type),
        FnProbe::keyed(keys::DOWNLINK, downlink),
        FnProbe::keyed(keys::RTT, rtt),
        FnProbe::keyed(keys::DO_NOT_TRACK, do_not_track),
        FnProbe::keyed(keys::MATH_PRECISION, math_precision),
        FnProbe::keyed(keys::WEBDRIVER, webdriver),
    ]
}

fn present<T>(value: Option<T>) -> Result<T, ProbeFault> {
    value.ok_or(ProbeFault::Unsupported)
}

fn user_agent(env: &dyn BrowserEnvironment) -> Reading {
    present(env.navigator().user_agent).into()
}

fn time_zone(env: &dyn BrowserEnvironment) -> Reading {
    env.time_zone().into()
}

fn timezone_offset(env: &dyn BrowserEnvironment) -> Reading {
    Reading::value(env.timezone_offset_minutes())
}

fn language(env: &dyn BrowserEnvironment) -> Reading {
    present(env.navigator().language).into()
}

fn languages(env: &dyn BrowserEnvironment) -> Reading {
    present(env.navigator().languages)
        .map(|list| list.join(", "))
        .into()
}

fn screen_resolution(env: &dyn BrowserEnvironment) -> Reading {
    env.screen()
        .map(|screen| format!("{}x{}", screen.width, screen.height))
        .into()
}

fn available_screen(env: &dyn BrowserEnvironment) -> Reading {
    env.screen()
        .map(|screen| format!("{}x{}", screen.avail_width, screen.avail_height))
        .into()
}

fn color_depth(env: &dyn BrowserEnvironment) -> Reading {
    env.screen().map(|screen| screen.color_depth).into()
}

fn cookies_enabled(env: &dyn BrowserEnvironment) -> Reading {
    Reading::value(env.navigator().cookie_enabled)
}

fn hardware_concurrency(env: &dyn BrowserEnvironment) -> Reading {
    // Zero means the property is blanked, not a machine without cores.
    present(env.navigator().hardware_concurrency.filter(|cores| *cores > 0)).into()
}

fn max_touch_points(env: &dyn BrowserEnvironment) -> Reading {
    Reading::value(env.navigator().max_touch_points.unwrap_or(0))
}

fn device_memory(env: &dyn BrowserEnvironment) -> Reading {
    present(env.navigator().device_memory_gb).into()
}

fn bluetooth(env: &dyn BrowserEnvironment) -> Reading {
    Reading::value(env.navigator().bluetooth)
}

fn effective_network_type(env: &dyn BrowserEnvironment) -> Reading {
    present(env.connection().and_then(|c| c.effective_type)).into()
}

fn downlink(env: &dyn BrowserEnvironment) -> Reading {
    present(env.connection().and_then(|c| c.downlink_mbps)).into()
}

fn rtt(env: &dyn BrowserEnvironment) -> Reading {
    present(env.connection().and_then(|c| c.rtt_ms)).into()
}

fn do_not_track(env: &dyn BrowserEnvironment) -> Reading {
    let status = match env.navigator().do_not_track.as_deref() {
        Some("1") | Some("yes") => "enabled",
        Some("0") | Some("no") => "disabled",
        _ => "unset",
    };
    Reading::value(status)
}

fn math_precision(env: &dyn BrowserEnvironment) -> Reading {
    let results: Result<Vec<String>, ProbeFault> = MathFunction::ALL
        .iter()
        .map(|function| {
            env.math(*function, MATH_INPUT)
                .map(|result| result.to_string())
        })
        .collect();
    results.map(|values| values.join(",")).into()
}

fn webdriver(env: &dyn BrowserEnvironment) -> Reading {
    present(env.navigator().webdriver).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::core::FingerprintValue;
    use crate::collection::probes::ImmediateProbe;
    use crate::environment::{ConnectionInfo, SimulatedEnvironment};

    fn read(env: &SimulatedEnvironment, key: &str) -> Reading {
        let probe = probes()
            .into_iter()
            .find(|probe| probe.key() == key)
            .unwrap();
        probe.read(env)
    }

    #[test]
    fn formats_screen_and_language_attributes() {
        let env = SimulatedEnvironment::desktop_chrome();
        assert_eq!(read(&env, keys::SCREEN_RESOLUTION), Reading::value("1920x1080"));
        assert_eq!(read(&env, keys::AVAILABLE_SCREEN), Reading::value("1920x1040"));
        assert_eq!(read(&env, keys::LANGUAGES), Reading::value("en-US, en"));
        assert_eq!(read(&env, keys::COLOR_DEPTH), Reading::value(24_u32));
        assert_eq!(read(&env, keys::TIMEZONE_OFFSET), Reading::value(300));
    }

    #[test]
    fn do_not_track_maps_header_spellings() {
        for (raw, expected) in [
            (Some("1"), "enabled"),
            (Some("yes"), "enabled"),
            (Some("0"), "disabled"),
            (Some("no"), "disabled"),
            (Some("unspecified"), "unset"),
            (None, "unset"),
        ] {
            let env = SimulatedEnvironment::desktop_chrome()
                .with_navigator(|nav| nav.do_not_track = raw.map(str::to_string));
            assert_eq!(read(&env, keys::DO_NOT_TRACK), Reading::value(expected), "{raw:?}");
        }
    }

    #[test]
    fn missing_connection_reads_as_unsupported() {
        let env = SimulatedEnvironment::desktop_chrome().with_connection(None);
        for key in [keys::EFFECTIVE_NETWORK_TYPE, keys::DOWNLINK, keys::RTT] {
            assert_eq!(read(&env, key), Reading::fault(ProbeFault::Unsupported));
        }

        let env = SimulatedEnvironment::desktop_chrome().with_connection(Some(ConnectionInfo {
            effective_type: Some("3g".into()),
            downlink_mbps: None,
            rtt_ms: Some(300),
        }));
        assert_eq!(read(&env, keys::EFFECTIVE_NETWORK_TYPE), Reading::value("3g"));
        assert_eq!(read(&env, keys::DOWNLINK), Reading::fault(ProbeFault::Unsupported));
        assert_eq!(read(&env, keys::RTT), Reading::value(300_u32));
    }

    #[test]
    fn math_precision_lists_six_functions() {
        let env = SimulatedEnvironment::desktop_chrome();
        let Reading::Value(FingerprintValue::Text(text)) = read(&env, keys::MATH_PRECISION) else {
            panic!("expected text");
        };
        let parts: Vec<&str> = text.split(',').collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[4], 0.5_f64.sin().to_string());
    }

    #[test]
    fn absent_navigator_fields_fall_back() {
        let env = SimulatedEnvironment::desktop_chrome().with_navigator(|nav| {
            nav.hardware_concurrency = Some(0);
            nav.max_touch_points = None;
            nav.webdriver = None;
        });
        assert_eq!(
            read(&env, keys::HARDWARE_CONCURRENCY),
            Reading::fault(ProbeFault::Unsupported)
        );
        assert_eq!(read(&env, keys::MAX_TOUCH_POINTS), Reading::value(0_u32));
        assert_eq!(read(&env, keys::WEBDRIVER), Reading::fault(ProbeFault::Unsupported));
    }
}
