//! Hand-rolled MVT payload assembly for tests.

/// Encodes a base-128 varint
pub fn varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

pub fn zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn key(tag: u32, wire: u32) -> Vec<u8> {
    varint(u64::from(tag << 3 | wire))
}

fn len_delim(tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = key(tag, 2);
    out.extend(varint(payload.len() as u64));
    out.extend_from_slice(payload);
    out
}

fn packed(tag: u32, values: &[u32]) -> Vec<u8> {
    let mut payload = Vec::new();
    for &v in values {
        payload.extend(varint(u64::from(v)));
    }
    len_delim(tag, &payload)
}

/// Assembles a whole tile message from layer closures
pub struct TileBuilder {
    layers: Vec<Vec<u8>>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn layer<R>(mut self, name: &str, build: impl FnOnce(&mut LayerBuilder) -> R) -> Self {
        let mut layer = LayerBuilder::new(name);
        build(&mut layer);
        self.layers.push(layer.encode());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        for layer in &self.layers {
            out.extend(len_delim(3, layer));
        }
        out
    }
}

impl Default for TileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles one layer message
pub struct LayerBuilder {
    name: String,
    extent: u32,
    keys: Vec<String>,
    values: Vec<Vec<u8>>,
    features: Vec<Vec<u8>>,
}

impl LayerBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extent: 4096,
            keys: Vec::new(),
            values: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Single-ring polygon from tile-unit coordinates
    pub fn polygon_feature(&mut self, points: &[(i32, i32)]) -> &mut Self {
        let geometry = encode_path(points, true);
        self.features.push(encode_feature(3, &geometry, &[]));
        self
    }

    pub fn line_feature(&mut self, points: &[(i32, i32)]) -> &mut Self {
        let geometry = encode_path(points, false);
        self.features.push(encode_feature(2, &geometry, &[]));
        self
    }

    pub fn point_feature(&mut self, x: i32, y: i32) -> &mut Self {
        let geometry = vec![(1 << 3) | 1, zigzag32(x), zigzag32(y)];
        self.features.push(encode_feature(1, &geometry, &[]));
        self
    }

    /// Point feature tagged with a `name` attribute and optional `rank`
    pub fn point_feature_with_name(
        &mut self,
        x: i32,
        y: i32,
        name: &str,
        rank: Option<i64>,
    ) -> &mut Self {
        let name_key = self.intern_key("name");
        let name_value = self.intern_value(len_delim(1, name.as_bytes()));
        let mut tags = vec![name_key, name_value];
        if let Some(rank) = rank {
            let rank_key = self.intern_key("rank");
            let mut value = key(4, 0);
            value.extend(varint(rank as u64));
            let rank_value = self.intern_value(value);
            tags.extend([rank_key, rank_value]);
        }
        let geometry = vec![(1 << 3) | 1, zigzag32(x), zigzag32(y)];
        self.features.push(encode_feature(1, &geometry, &tags));
        self
    }

    fn intern_key(&mut self, name: &str) -> u32 {
        if let Some(i) = self.keys.iter().position(|k| k == name) {
            return i as u32;
        }
        self.keys.push(name.to_string());
        (self.keys.len() - 1) as u32
    }

    fn intern_value(&mut self, encoded: Vec<u8>) -> u32 {
        self.values.push(encoded);
        (self.values.len() - 1) as u32
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(key(15, 0));
        out.extend(varint(2));
        out.extend(len_delim(1, self.name.as_bytes()));
        for feature in &self.features {
            out.extend(len_delim(2, feature));
        }
        for k in &self.keys {
            out.extend(len_delim(3, k.as_bytes()));
        }
        for v in &self.values {
            out.extend(len_delim(4, v));
        }
        out.extend(key(5, 0));
        out.extend(varint(u64::from(self.extent)));
        out
    }
}

fn encode_feature(kind: u64, geometry: &[u32], tags: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    if !tags.is_empty() {
        out.extend(packed(2, tags));
    }
    out.extend(key(3, 0));
    out.extend(varint(kind));
    out.extend(packed(4, geometry));
    out
}

fn encode_path(points: &[(i32, i32)], close: bool) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut cx, mut cy) = (0, 0);
    for (i, &(x, y)) in points.iter().enumerate() {
        if i == 0 {
            out.push((1 << 3) | 1);
        } else if i == 1 {
            out.push((((points.len() - 1) as u32) << 3) | 2);
        }
        out.push(zigzag32(x - cx));
        out.push(zigzag32(y - cy));
        cx = x;
        cy = y;
    }
    if close {
        out.push((1 << 3) | 7);
    }
    out
}
