use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata for one layer of a satellite product, as served by the product
/// metadata endpoint. Unknown fields in the response are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    #[serde(rename = "AddOffset", default)]
    pub add_offset: Option<f64>,

    #[serde(rename = "Available", default)]
    pub available: bool,

    #[serde(rename = "DataType", default)]
    pub data_type: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "FillValue")]
    pub fill_value: f64,

    #[serde(rename = "IsQA", default)]
    pub is_qa: bool,

    #[serde(rename = "Layer", default)]
    pub layer: String,

    #[serde(rename = "ScaleFactor", default)]
    pub scale_factor: Option<f64>,

    #[serde(rename = "Units", default)]
    pub units: String,

    #[serde(rename = "ValidMax")]
    pub valid_max: f64,

    #[serde(rename = "ValidMin")]
    pub valid_min: f64,
}

impl Layer {
    /// Whether a raw cell value is inside the layer's validity envelope.
    pub fn is_valid(&self, value: f64) -> bool {
        !(value > self.valid_max || value < self.valid_min || value == self.fill_value)
    }
}

/// A satellite product (`NAME.VVV`) and its layer map. Layers are kept in a
/// BTreeMap so normalization walks them in a stable order.
#[derive(Debug, Clone)]
pub struct Product {
    pub product: String,
    pub layers: BTreeMap<String, Layer>,
}

impl Product {
    pub fn new(product: String, layers: BTreeMap<String, Layer>) -> Self {
        Self { product, layers }
    }

    /// Layers eligible for ingestion (QA layers are excluded).
    pub fn data_layers(&self) -> impl Iterator<Item = (&String, &Layer)> {
        self.layers.iter().filter(|(_, v)| !v.is_qa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndvi_layer() -> Layer {
        serde_json::from_str(
            r#"{
                "AddOffset": 0.0,
                "Available": true,
                "DataType": "int16",
                "Description": "16 day NDVI average",
                "Dimensions": ["time", "YDim", "XDim"],
                "FillValue": -3000,
                "IsQA": false,
                "Layer": "_500m_16_days_NDVI",
                "OrigDataType": "int16",
                "OrigValidMax": 10000,
                "OrigValidMin": -2000,
                "ScaleFactor": 0.0001,
                "Units": "NDVI",
                "ValidMax": 1.0,
                "ValidMin": -0.2,
                "XSize": 2400,
                "YSize": 2400
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_layer_from_metadata_response() {
        let layer = ndvi_layer();
        assert_eq!(layer.fill_value, -3000.0);
        assert!(!layer.is_qa);
        assert_eq!(layer.valid_max, 1.0);
        assert_eq!(layer.scale_factor, Some(0.0001));
    }

    #[test]
    fn test_validity_envelope() {
        let layer = ndvi_layer();
        assert!(layer.is_valid(0.65));
        assert!(!layer.is_valid(1.2));
        assert!(!layer.is_valid(-0.3));
        assert!(!layer.is_valid(-3000.0));
    }

    #[test]
    fn test_data_layers_excludes_qa() {
        let mut qa = ndvi_layer();
        qa.is_qa = true;
        let mut layers = BTreeMap::new();
        layers.insert("_500m_16_days_NDVI".to_string(), ndvi_layer());
        layers.insert("_500m_16_days_VI_Quality".to_string(), qa);

        let product = Product::new("MOD13A1.061".to_string(), layers);
        let kept: Vec<&String> = product.data_layers().map(|(k, _)| k).collect();
        assert_eq!(kept, vec!["_500m_16_days_NDVI"]);
    }
}
