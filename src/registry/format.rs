// JSON <-> typed specification conversion, per version.
//
// Field names follow the published wire format: flat documents (v1-v3) carry their single
// container at the top level (`port`/`containerPort` in v1, `ports`/`containerPorts`/`domains`
// from v2), `instances` from v3, `compose` from v4 and `contacts`/`geolocation` from v5.
// Numbers may arrive as JSON numbers or numeric strings; lists may arrive as JSON arrays or as
// strings holding a JSON array.

use serde_json::{json, Map, Value};

use crate::model::hardware::{Hardware, Resources, Tier, TieredResources};
use crate::model::spec::{
    AppSpec, Component, ComposedSpec, FlatSpec, SpecMeta, COMPOSE_SINCE, DEFAULT_INSTANCES,
    GEO_SINCE, INSTANCES_SINCE, MAX_VERSION, MIN_VERSION,
};
use crate::model::ValidationError;

type Obj = Map<String, Value>;

/// Read access to one JSON object with error paths relative to `prefix`.
struct Fields<'a> {
    obj: &'a Obj,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn new(obj: &'a Obj, prefix: impl Into<String>) -> Self {
        Self {
            obj,
            prefix: prefix.into(),
        }
    }

    fn err(&self, key: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::new(format!("{}{}", self.prefix, key), reason)
    }

    fn raw(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn string(&self, key: &str) -> Result<String, ValidationError> {
        match self.raw(key) {
            Some(Value::String(s)) => Ok(s.trim().to_string()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(_) => Err(self.err(key, "must be a string")),
            None => Err(self.err(key, "is required")),
        }
    }

    fn opt_string(&self, key: &str) -> Result<String, ValidationError> {
        if self.raw(key).is_none() {
            return Ok(String::new());
        }
        self.string(key)
    }

    fn number(&self, key: &str) -> Result<f64, ValidationError> {
        let n = match self.raw(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
            None => return Err(self.err(key, "is required")),
        };
        match n {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(self.err(key, "must be a number")),
        }
    }

    fn integer(&self, key: &str) -> Result<u64, ValidationError> {
        let v = self.number(key)?;
        if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
            return Err(self.err(key, "must be a non-negative integer"));
        }
        Ok(v as u64)
    }

    fn boolean(&self, key: &str) -> Result<bool, ValidationError> {
        match self.raw(key) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s == "true" => Ok(true),
            Some(Value::String(s)) if s == "false" => Ok(false),
            Some(_) => Err(self.err(key, "must be a boolean")),
        }
    }

    /// Array, or a string holding a JSON array. Missing means empty.
    fn list(&self, key: &str) -> Result<Vec<Value>, ValidationError> {
        match self.raw(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Array(items)) => Ok(items),
                _ => Err(self.err(key, "must be an array")),
            },
            Some(_) => Err(self.err(key, "must be an array")),
        }
    }

    fn strings(&self, key: &str) -> Result<Vec<String>, ValidationError> {
        self.list(key)?
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(self.err(key, "must contain strings")),
            })
            .collect()
    }

    fn ports(&self, key: &str) -> Result<Vec<u16>, ValidationError> {
        self.list(key)?
            .into_iter()
            .map(|v| port_of(&v).ok_or_else(|| self.err(key, "must contain ports 1-65535")))
            .collect()
    }

    fn port(&self, key: &str) -> Result<u16, ValidationError> {
        let v = self.raw(key).ok_or_else(|| self.err(key, "is required"))?;
        port_of(v).ok_or_else(|| self.err(key, "must be a port 1-65535"))
    }
}

fn port_of(v: &Value) -> Option<u16> {
    let n = match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u16::try_from(n).ok().filter(|p| *p > 0)
}

fn resources(f: &Fields, suffix: &str) -> Result<Resources, ValidationError> {
    Ok(Resources::new(
        f.number(&format!("cpu{suffix}"))?,
        f.number(&format!("ram{suffix}"))?,
        f.number(&format!("hdd{suffix}"))?,
    ))
}

fn hardware(f: &Fields) -> Result<Hardware, ValidationError> {
    let flat = resources(f, "")?;
    let tiered = if f.boolean("tiered")? {
        Some(TieredResources {
            cumulus: resources(f, Tier::Cumulus.suffix())?,
            nimbus: resources(f, Tier::Nimbus.suffix())?,
            stratus: resources(f, Tier::Stratus.suffix())?,
        })
    } else {
        None
    };
    Ok(Hardware { flat, tiered })
}

fn environment(f: &Fields) -> Result<Vec<String>, ValidationError> {
    // Early clients misspelled the key; both spellings are accepted.
    if f.raw("environmentParameters").is_some() {
        f.strings("environmentParameters")
    } else {
        f.strings("enviromentParameters")
    }
}

fn component(f: &Fields, name: String, description: String, version: u8) -> Result<Component, ValidationError> {
    let (ports, container_ports, domains) = if version == 1 {
        (vec![f.port("port")?], vec![f.port("containerPort")?], Vec::new())
    } else {
        (f.ports("ports")?, f.ports("containerPorts")?, f.strings("domains")?)
    };
    Ok(Component {
        name,
        description,
        repotag: f.string("repotag")?,
        ports,
        container_ports,
        domains,
        environment: environment(f)?,
        commands: f.strings("commands")?,
        container_data: f.opt_string("containerData")?,
        hardware: hardware(f)?,
    })
}

/// Coerces a raw document into a typed specification, rejecting missing or mistyped fields.
pub fn format(raw: Value) -> Result<AppSpec, ValidationError> {
    let Value::Object(obj) = raw else {
        return Err(ValidationError::new("specification", "must be an object"));
    };
    let f = Fields::new(&obj, "");

    let version = f.integer("version")?;
    if !(MIN_VERSION as u64..=MAX_VERSION as u64).contains(&version) {
        return Err(f.err("version", format!("must be between {MIN_VERSION} and {MAX_VERSION}")));
    }
    let version = version as u8;

    let instances = if version >= INSTANCES_SINCE {
        u32::try_from(f.integer("instances")?).map_err(|_| f.err("instances", "out of range"))?
    } else {
        DEFAULT_INSTANCES
    };
    let (contacts, geolocation) = if version >= GEO_SINCE {
        (f.strings("contacts")?, f.strings("geolocation")?)
    } else {
        (Vec::new(), Vec::new())
    };

    let meta = SpecMeta {
        version,
        name: f.string("name")?,
        description: f.opt_string("description")?,
        owner: f.string("owner")?,
        instances,
        contacts,
        geolocation,
    };

    if version < COMPOSE_SINCE {
        let app = component(&f, meta.name.clone(), meta.description.clone(), version)?;
        return Ok(AppSpec::Flat(FlatSpec { meta, app }));
    }

    let raw_components = f.list("compose")?;
    if raw_components.is_empty() {
        return Err(f.err("compose", "must list at least one component"));
    }
    let mut components = Vec::with_capacity(raw_components.len());
    for (i, raw) in raw_components.iter().enumerate() {
        let Value::Object(cobj) = raw else {
            return Err(ValidationError::new(format!("compose[{i}]"), "must be an object"));
        };
        let cf = Fields::new(cobj, format!("compose[{i}]."));
        let name = cf.string("name")?;
        let description = cf.opt_string("description")?;
        components.push(component(&cf, name, description, version)?);
    }
    Ok(AppSpec::Composed(ComposedSpec { meta, components }))
}

/// Integral values are written as integers so the canonical text does not depend on float
/// formatting.
fn num(v: f64) -> Value {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

fn put_hardware(out: &mut Obj, hw: &Hardware) {
    out.insert("cpu".into(), num(hw.flat.cpu));
    out.insert("ram".into(), num(hw.flat.ram));
    out.insert("hdd".into(), num(hw.flat.hdd));
    out.insert("tiered".into(), json!(hw.tiered.is_some()));
    if let Some(t) = &hw.tiered {
        for tier in Tier::ALL {
            let r = t.get(tier);
            out.insert(format!("cpu{}", tier.suffix()), num(r.cpu));
            out.insert(format!("ram{}", tier.suffix()), num(r.ram));
            out.insert(format!("hdd{}", tier.suffix()), num(r.hdd));
        }
    }
}

fn put_container(out: &mut Obj, c: &Component, version: u8, env_key: &str) {
    out.insert("repotag".into(), json!(c.repotag));
    if version == 1 {
        out.insert("port".into(), c.ports.first().map_or(Value::Null, |p| json!(p)));
        out.insert(
            "containerPort".into(),
            c.container_ports.first().map_or(Value::Null, |p| json!(p)),
        );
    } else {
        out.insert("ports".into(), json!(c.ports));
        out.insert("containerPorts".into(), json!(c.container_ports));
        out.insert("domains".into(), json!(c.domains));
    }
    out.insert(env_key.into(), json!(c.environment));
    out.insert("commands".into(), json!(c.commands));
    out.insert("containerData".into(), json!(c.container_data));
    put_hardware(out, &c.hardware);
}

/// Renders the wire document for a typed specification.
pub fn to_value(spec: &AppSpec) -> Value {
    let meta = spec.meta();
    let mut out = Obj::new();
    out.insert("version".into(), json!(meta.version));
    out.insert("name".into(), json!(meta.name));
    out.insert("description".into(), json!(meta.description));
    out.insert("owner".into(), json!(meta.owner));
    if meta.version >= INSTANCES_SINCE {
        out.insert("instances".into(), json!(meta.instances));
    }
    if meta.version >= GEO_SINCE {
        out.insert("contacts".into(), json!(meta.contacts));
        out.insert("geolocation".into(), json!(meta.geolocation));
    }

    match spec {
        AppSpec::Flat(s) => put_container(&mut out, &s.app, meta.version, "enviromentParameters"),
        AppSpec::Composed(s) => {
            let compose: Vec<Value> = s
                .components
                .iter()
                .map(|c| {
                    let mut co = Obj::new();
                    co.insert("name".into(), json!(c.name));
                    co.insert("description".into(), json!(c.description));
                    put_container(&mut co, c, meta.version, "environmentParameters");
                    Value::Object(co)
                })
                .collect();
            out.insert("compose".into(), Value::Array(compose));
        }
    }
    Value::Object(out)
}

impl TryFrom<Value> for AppSpec {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        format(value)
    }
}

impl From<AppSpec> for Value {
    fn from(spec: AppSpec) -> Value {
        to_value(&spec)
    }
}

#[cfg(test)]
#[path = "format_test.rs"]
mod format_test;
