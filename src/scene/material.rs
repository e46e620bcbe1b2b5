use bon::bon;

pub type Rgb = rgb::RGB<f32>;

/// Surface appearance, referenced from surfaces by name.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse: Rgb,
    pub specular: Rgb,
    pub emission: Rgb,
    /// Phong exponent of the specular lobe
    pub shininess: f32,
    /// Fraction of light mirrored, 0 to 1
    pub reflectivity: f32,
}

#[bon]
impl Material {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(default = Rgb::new(0.8, 0.8, 0.8))] diffuse: Rgb,
        #[builder(default = Rgb::new(0.0, 0.0, 0.0))] specular: Rgb,
        #[builder(default = Rgb::new(0.0, 0.0, 0.0))] emission: Rgb,
        #[builder(default = 1.0)] shininess: f32,
        #[builder(default = 0.0)] reflectivity: f32,
    ) -> Self {
        assert!(shininess >= 0.0);
        assert!((0.0..=1.0).contains(&reflectivity));

        Material {
            name,
            diffuse,
            specular,
            emission,
            shininess,
            reflectivity,
        }
    }
}

impl Material {
    pub fn is_emissive(&self) -> bool {
        let Rgb { r, g, b } = self.emission;
        r > 0.0 || g > 0.0 || b > 0.0
    }
}
