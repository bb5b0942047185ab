//! Stock host components: the motion `ToolHead` and a part-cooling `Fan`.
//!
//! These are the host classes the bundled patch plugins target. They follow
//! the host's conventions: state lives on the instance, constructors are
//! `__init__`, and G-code commands forward to `cmd_*` methods through the
//! live method table so patched methods are picked up.
use std::sync::Arc;

use serde_json::{json, Value};

use crate::host::class::{HostClass, CONSTRUCTOR};
use crate::host::config::ConfigSection;
use crate::host::error::{HostError, HostResult};
use crate::host::gcode::method_handler;
use crate::host::instance::{arg_f64, arg_object};
use crate::host::printer::{Printer, PrinterObject};

pub const TOOLHEAD_CLASS: &str = "ToolHead";
pub const FAN_CLASS: &str = "Fan";
pub const TOOLHEAD_OBJECT: &str = "toolhead";
pub const FAN_OBJECT: &str = "fan";

/// Register the stock classes and the `[printer]` / `[fan]` extras.
pub fn install(printer: &Arc<Printer>) {
    printer.register_class(toolhead_class());
    printer.register_class(fan_class());
    printer.register_extra("printer", load_printer);
    printer.register_extra("fan", load_fan);
}

/// Placeholder registered for the `[printer]` section itself.
struct PrinterSection;

impl PrinterObject for PrinterSection {}

fn load_printer(config: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let printer = config.printer()?;
    let settings = json!({
        "kinematics": config.get_or("kinematics", "none"),
        "max_velocity": config.getfloat("max_velocity")?,
        "max_accel": config.getfloat("max_accel")?,
        "square_corner_velocity": config.getfloat_or("square_corner_velocity", 5.0)?,
        "minimum_cruise_ratio": config.getfloat_or("minimum_cruise_ratio", 0.5)?,
    });
    let toolhead = printer.class(TOOLHEAD_CLASS)?.instantiate(&printer, &[settings])?;
    printer.add_object(TOOLHEAD_OBJECT, toolhead)?;
    Ok(Arc::new(PrinterSection))
}

fn load_fan(config: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let printer = config.printer()?;
    let settings = json!({
        "pin": config.get_or("pin", ""),
        "max_power": config.getfloat_or("max_power", 1.0)?,
        "off_below": config.getfloat_or("off_below", 0.0)?,
    });
    let fan = printer.class(FAN_CLASS)?.instantiate(&printer, &[settings])?;

    let gcode = printer.gcode()?;
    let handle = fan.clone();
    gcode.register_command("M106", Some("Set fan speed"), move |gcmd| {
        let value = gcmd.get_float("S")?.unwrap_or(255.0) / 255.0;
        handle.call("set_speed", &[json!(0.0), json!(value)])?;
        Ok(())
    })?;
    let handle = fan.clone();
    gcode.register_command("M107", Some("Turn fan off"), move |_gcmd| {
        handle.call("set_speed", &[json!(0.0), json!(0.0)])?;
        Ok(())
    })?;
    Ok(fan)
}

/// `ToolHead`: velocity limits plus `SET_VELOCITY_LIMIT`.
pub fn toolhead_class() -> Arc<HostClass> {
    let class = HostClass::new(TOOLHEAD_CLASS);
    class
        .define(CONSTRUCTOR, |this, args| {
            let settings = arg_object(args, 0, "ToolHead.__init__")?;
            for key in ["max_velocity", "max_accel", "square_corner_velocity", "minimum_cruise_ratio"] {
                let value = settings.get(key).and_then(Value::as_f64).ok_or_else(|| HostError::BadArgument {
                    method: "ToolHead.__init__".into(),
                    index: 0,
                })?;
                this.set(key, value);
            }
            this.call("_calc_junction_deviation", &[])?;
            this.call("register_gcode_handlers", &[])?;
            Ok(Value::Null)
        })
        .define("_calc_junction_deviation", |this, _args| {
            let scv = this.get_f64("square_corner_velocity")?;
            let accel = this.get_f64("max_accel")?;
            let deviation = if accel > 0.0 { scv * scv * (2f64.sqrt() - 1.0) / accel } else { 0.0 };
            this.set("junction_deviation", deviation);
            Ok(Value::Null)
        })
        .define("register_gcode_handlers", |this, _args| {
            let gcode = this.printer()?.gcode()?;
            gcode.register_command(
                "SET_VELOCITY_LIMIT",
                Some("Set printer velocity limits"),
                method_handler(this, "cmd_SET_VELOCITY_LIMIT")?,
            )?;
            Ok(Value::Null)
        })
        .define("cmd_SET_VELOCITY_LIMIT", |this, args| {
            let params = arg_object(args, 0, "ToolHead.cmd_SET_VELOCITY_LIMIT")?;
            let updates = [
                ("VELOCITY", "max_velocity"),
                ("ACCEL", "max_accel"),
                ("SQUARE_CORNER_VELOCITY", "square_corner_velocity"),
                ("MINIMUM_CRUISE_RATIO", "minimum_cruise_ratio"),
            ];
            for (param, key) in updates {
                if let Some(raw) = params.get(param).and_then(Value::as_str) {
                    let value: f64 = raw
                        .parse()
                        .map_err(|_| HostError::command(format!("Unable to parse {}={}", param, raw)))?;
                    if value < 0.0 {
                        return Err(HostError::command(format!("{} must not be negative", param)));
                    }
                    this.set(key, value);
                }
            }
            this.call("_calc_junction_deviation", &[])?;
            Ok(Value::String(velocity_report(this)?))
        });
    class
}

/// Multi-line summary of the current velocity limits.
pub fn velocity_report(this: &crate::host::Instance) -> HostResult<String> {
    Ok(format!(
        "max_velocity: {:.6}\nmax_accel: {:.6}\nminimum_cruise_ratio: {:.6}\nsquare_corner_velocity: {:.6}",
        this.get_f64("max_velocity")?,
        this.get_f64("max_accel")?,
        this.get_f64_or("minimum_cruise_ratio", 0.0),
        this.get_f64("square_corner_velocity")?,
    ))
}

/// `Fan`: `set_speed` delegates to `_apply_speed`, which applies
/// `off_below` and `max_power` to the requested value.
pub fn fan_class() -> Arc<HostClass> {
    let class = HostClass::new(FAN_CLASS);
    class
        .define(CONSTRUCTOR, |this, args| {
            let settings = arg_object(args, 0, "Fan.__init__")?;
            let max_power = settings.get("max_power").and_then(Value::as_f64).unwrap_or(1.0);
            let off_below = settings.get("off_below").and_then(Value::as_f64).unwrap_or(0.0);
            if !(max_power > 0.0 && max_power <= 1.0) {
                return Err(HostError::command(format!("max_power={} must be in (0, 1]", max_power)));
            }
            if !(0.0..=1.0).contains(&off_below) {
                return Err(HostError::command(format!("off_below={} must be in [0, 1]", off_below)));
            }
            this.set("max_power", max_power);
            this.set("off_below", off_below);
            this.set("speed", 0.0);
            this.set("power", 0.0);
            Ok(Value::Null)
        })
        .define("_apply_speed", |this, args| {
            let print_time = arg_f64(args, 0, "Fan._apply_speed")?;
            let mut value = arg_f64(args, 1, "Fan._apply_speed")?;
            let max_power = this.get_f64("max_power")?;
            if value < this.get_f64_or("off_below", 0.0) {
                value = 0.0;
            }
            let power = (value * max_power).clamp(0.0, max_power);
            this.set("speed", value);
            this.set("power", power);
            this.set("last_print_time", print_time);
            Ok(Value::Null)
        })
        .define("set_speed", |this, args| {
            let print_time = arg_f64(args, 0, "Fan.set_speed")?;
            let value = arg_f64(args, 1, "Fan.set_speed")?;
            this.call("_apply_speed", &[json!(print_time), json!(value)])
        });
    class
}
