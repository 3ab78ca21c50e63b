//! Handler catalog: the per-specialist profiles and the shared-entity
//! preference table. Both are product data supplied through configuration;
//! the built-in default describes the London Underground.

use serde::{Deserialize, Serialize};

/// Configuration for one specialist handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerProfile {
    /// Classification token, e.g. `CIRCLE`.
    pub id: String,
    /// Display name, e.g. `Circle`.
    pub name: String,
    /// Case-insensitive regex for an explicit, unambiguous mention.
    pub mention_pattern: String,
    /// Lower-case substrings that count towards keyword confidence.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Lower-case names of the entities (stations) this handler serves.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub specialization: String,
    /// Whether the classifier may route to this handler directly.
    #[serde(default = "default_true")]
    pub routable: bool,
}

fn default_true() -> bool {
    true
}

/// An entity served by several handlers, with the one that should answer
/// urgent (arrival-time) questions about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedEntity {
    pub name: String,
    pub served_by: Vec<String>,
    pub preferred: String,
}

/// The `[catalog]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub handlers: Vec<HandlerProfile>,
    pub shared_entities: Vec<SharedEntity>,
    /// Handler that answers network-wide status questions.
    pub status_handler: String,
    /// High-traffic handlers always consulted for network-wide questions.
    pub high_traffic: Vec<String>,
    /// Collaborators for journeys whose endpoints name no known entity.
    pub journey_defaults: Vec<String>,
    /// Collaborators for station questions that name no known entity.
    pub station_defaults: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            handlers: london_underground(),
            shared_entities: london_shared_entities(),
            status_handler: "STATUS".to_string(),
            high_traffic: strings(&["CENTRAL", "CIRCLE", "BAKERLOO", "DISTRICT"]),
            journey_defaults: strings(&["CENTRAL", "CIRCLE", "DISTRICT"]),
            station_defaults: strings(&["CENTRAL", "CIRCLE"]),
        }
    }
}

impl CatalogConfig {
    pub fn profile(&self, id: &str) -> Option<&HandlerProfile> {
        self.handlers.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Ids of every handler the classifier may route to.
    pub fn routable_ids(&self) -> Vec<String> {
        self.handlers
            .iter()
            .filter(|p| p.routable)
            .map(|p| p.id.clone())
            .collect()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn line(
    id: &str,
    name: &str,
    mention_pattern: &str,
    color: &str,
    specialization: &str,
    keywords: &[&str],
    entities: &[&str],
) -> HandlerProfile {
    HandlerProfile {
        id: id.to_string(),
        name: name.to_string(),
        mention_pattern: mention_pattern.to_string(),
        keywords: strings(keywords),
        entities: strings(entities),
        color: color.to_string(),
        specialization: specialization.to_string(),
        routable: true,
    }
}

// =============================================================================
// Built-in catalog
// =============================================================================

/// The twelve Underground/Elizabeth line specialists plus network status.
pub fn london_underground() -> Vec<HandlerProfile> {
    let mut profiles = vec![
        line(
            "BAKERLOO",
            "Bakerloo",
            r"(?i)\bbakerloo(\s+line)?\b",
            "#B36305",
            "North-west to south London via the West End",
            &[
                "bakerloo",
                "paddington",
                "waterloo",
                "elephant & castle",
                "elephant and castle",
                "harrow",
                "wealdstone",
                "piccadilly circus",
            ],
            &[
                "harrow & wealdstone",
                "queen's park",
                "maida vale",
                "paddington",
                "baker street",
                "oxford circus",
                "piccadilly circus",
                "charing cross",
                "embankment",
                "waterloo",
                "lambeth north",
                "elephant & castle",
            ],
        ),
        line(
            "CENTRAL",
            "Central",
            r"(?i)\bcentral(\s+line)?\b",
            "#E32017",
            "East-west through the City and West End",
            &[
                "central",
                "oxford circus",
                "bond street",
                "tottenham court road",
                "bank",
                "liverpool street",
                "stratford",
                "notting hill gate",
                "mile end",
                "bethnal green",
                "epping",
                "west ruislip",
            ],
            &[
                "west ruislip",
                "ealing broadway",
                "white city",
                "shepherd's bush",
                "notting hill gate",
                "marble arch",
                "bond street",
                "oxford circus",
                "tottenham court road",
                "holborn",
                "st. paul's",
                "bank",
                "liverpool street",
                "bethnal green",
                "mile end",
                "stratford",
                "epping",
            ],
        ),
        line(
            "CIRCLE",
            "Circle",
            r"(?i)\bcircle(\s+line)?\b",
            "#FFD300",
            "Loop around central London",
            &[
                "circle",
                "baker street",
                "king's cross",
                "victoria",
                "embankment",
                "monument",
                "westminster",
                "aldgate",
            ],
            &[
                "hammersmith",
                "paddington",
                "baker street",
                "king's cross",
                "farringdon",
                "barbican",
                "moorgate",
                "liverpool street",
                "aldgate",
                "tower hill",
                "monument",
                "bank",
                "embankment",
                "westminster",
                "st. james's park",
                "victoria",
                "sloane square",
                "south kensington",
                "gloucester road",
                "high street kensington",
                "notting hill gate",
                "edgware road",
            ],
        ),
        line(
            "DISTRICT",
            "District",
            r"(?i)\bdistrict(\s+line)?\b",
            "#00782A",
            "West-east across south-central London",
            &[
                "district",
                "earl's court",
                "wimbledon",
                "richmond",
                "upminster",
                "ealing broadway",
                "south kensington",
                "gloucester road",
                "high street kensington",
                "sloane square",
                "fulham broadway",
                "parsons green",
                "putney bridge",
                "east putney",
                "southfields",
                "wimbledon park",
                "barking",
                "dagenham",
                "hornchurch",
                "elm park",
                "upney",
                "becontree",
                "upminster bridge",
            ],
            &[
                "richmond",
                "ealing broadway",
                "wimbledon",
                "earl's court",
                "high street kensington",
                "notting hill gate",
                "paddington",
                "edgware road",
                "gloucester road",
                "south kensington",
                "sloane square",
                "victoria",
                "st. james's park",
                "westminster",
                "embankment",
                "temple",
                "monument",
                "tower hill",
                "whitechapel",
                "west ham",
                "barking",
                "upminster",
            ],
        ),
        line(
            "ELIZABETH",
            "Elizabeth",
            r"(?i)\b(elizabeth(\s+line)?|crossrail)\b",
            "#6950A1",
            "Cross-London rail between Reading, Heathrow, Abbey Wood and Shenfield",
            &[
                "elizabeth",
                "crossrail",
                "reading",
                "abbey wood",
                "shenfield",
                "custom house",
                "woolwich",
                "romford",
            ],
            &[
                "reading",
                "heathrow",
                "paddington",
                "bond street",
                "tottenham court road",
                "farringdon",
                "liverpool street",
                "whitechapel",
                "canary wharf",
                "custom house",
                "woolwich",
                "abbey wood",
                "stratford",
                "romford",
                "shenfield",
            ],
        ),
        line(
            "HAMMERSMITH_CITY",
            "Hammersmith & City",
            r"(?i)\bhammersmith\s*(&|and)?\s*city(\s+line)?\b",
            "#F3A9BB",
            "Hammersmith to Barking via the northern Circle",
            &[
                "hammersmith & city",
                "hammersmith and city",
                "goldhawk road",
                "shepherd's bush market",
                "wood lane",
                "latimer road",
            ],
            &[
                "hammersmith",
                "goldhawk road",
                "shepherd's bush market",
                "wood lane",
                "latimer road",
                "paddington",
                "baker street",
                "king's cross",
                "liverpool street",
                "whitechapel",
                "barking",
            ],
        ),
        line(
            "JUBILEE",
            "Jubilee",
            r"(?i)\bjubilee(\s+line)?\b",
            "#A0A5A9",
            "Stanmore to Stratford via Westminster and Canary Wharf",
            &[
                "jubilee",
                "stanmore",
                "canary wharf",
                "north greenwich",
                "bermondsey",
                "canada water",
            ],
            &[
                "stanmore",
                "wembley park",
                "baker street",
                "bond street",
                "green park",
                "westminster",
                "waterloo",
                "london bridge",
                "canada water",
                "canary wharf",
                "north greenwich",
                "west ham",
                "stratford",
            ],
        ),
        line(
            "METROPOLITAN",
            "Metropolitan",
            r"(?i)\bmetropolitan(\s+line)?\b",
            "#9B0056",
            "Aldgate to the north-west suburbs",
            &[
                "metropolitan",
                "amersham",
                "chesham",
                "harrow-on-the-hill",
                "moor park",
                "rickmansworth",
                "uxbridge",
            ],
            &[
                "amersham",
                "chesham",
                "watford",
                "uxbridge",
                "moor park",
                "rickmansworth",
                "harrow-on-the-hill",
                "wembley park",
                "finchley road",
                "baker street",
                "king's cross",
                "farringdon",
                "moorgate",
                "liverpool street",
                "aldgate",
            ],
        ),
        line(
            "NORTHERN",
            "Northern",
            r"(?i)\bnorthern(\s+line)?\b",
            "#000000",
            "North-south with Bank and Charing Cross branches",
            &[
                "northern",
                "morden",
                "edgware",
                "high barnet",
                "mill hill east",
                "old street",
                "angel",
                "camden town",
            ],
            &[
                "edgware",
                "high barnet",
                "mill hill east",
                "camden town",
                "euston",
                "king's cross",
                "angel",
                "old street",
                "moorgate",
                "bank",
                "london bridge",
                "tottenham court road",
                "leicester square",
                "charing cross",
                "embankment",
                "waterloo",
                "kennington",
                "battersea power station",
                "morden",
            ],
        ),
        line(
            "PICCADILLY",
            "Piccadilly",
            r"(?i)\bpiccadilly\s+line\b",
            "#003688",
            "Heathrow to Cockfosters via the West End",
            &[
                "piccadilly line",
                "cockfosters",
                "heathrow",
                "hyde park corner",
                "knightsbridge",
                "arsenal",
                "manor house",
            ],
            &[
                "heathrow",
                "uxbridge",
                "acton town",
                "hammersmith",
                "earl's court",
                "gloucester road",
                "south kensington",
                "knightsbridge",
                "hyde park corner",
                "green park",
                "piccadilly circus",
                "leicester square",
                "holborn",
                "king's cross",
                "arsenal",
                "finsbury park",
                "manor house",
                "cockfosters",
            ],
        ),
        line(
            "VICTORIA",
            "Victoria",
            r"(?i)\bvictoria\s+line\b",
            "#0098D4",
            "Brixton to Walthamstow via the West End",
            &[
                "victoria line",
                "brixton",
                "walthamstow",
                "pimlico",
                "vauxhall",
                "stockwell",
                "highbury & islington",
                "seven sisters",
            ],
            &[
                "brixton",
                "stockwell",
                "vauxhall",
                "pimlico",
                "victoria",
                "green park",
                "oxford circus",
                "warren street",
                "euston",
                "king's cross",
                "highbury & islington",
                "finsbury park",
                "seven sisters",
                "walthamstow central",
            ],
        ),
        line(
            "WATERLOO_CITY",
            "Waterloo & City",
            r"(?i)\bwaterloo\s*(&|and)\s*city(\s+line)?\b",
            "#95CDBA",
            "Shuttle between Waterloo and Bank",
            &["waterloo & city", "waterloo and city"],
            &["waterloo", "bank"],
        ),
    ];

    profiles.push(HandlerProfile {
        id: "STATUS".to_string(),
        name: "Network Status".to_string(),
        mention_pattern: r"(?i)\b(network\s+status|all\s+lines)\b".to_string(),
        keywords: strings(&[
            "status",
            "network",
            "all lines",
            "disruption",
            "good service",
            "delays",
        ]),
        entities: Vec::new(),
        color: "#1C3F94".to_string(),
        specialization: "Service status across the whole network".to_string(),
        routable: false,
    });

    profiles
}

fn shared(name: &str, served_by: &[&str], preferred: &str) -> SharedEntity {
    SharedEntity {
        name: name.to_string(),
        served_by: strings(served_by),
        preferred: preferred.to_string(),
    }
}

/// Interchange stations and the line that should answer arrival questions
/// about them.
pub fn london_shared_entities() -> Vec<SharedEntity> {
    vec![
        shared("westminster", &["CIRCLE", "DISTRICT", "JUBILEE"], "CIRCLE"),
        shared("victoria", &["CIRCLE", "DISTRICT", "VICTORIA"], "DISTRICT"),
        shared("embankment", &["CIRCLE", "DISTRICT", "BAKERLOO", "NORTHERN"], "CIRCLE"),
        shared("monument", &["CIRCLE", "DISTRICT"], "CIRCLE"),
        shared("baker street", &["CIRCLE", "BAKERLOO", "JUBILEE", "METROPOLITAN", "HAMMERSMITH_CITY"], "BAKERLOO"),
        shared("paddington", &["CIRCLE", "DISTRICT", "BAKERLOO", "HAMMERSMITH_CITY", "ELIZABETH"], "BAKERLOO"),
        shared("notting hill gate", &["CIRCLE", "DISTRICT", "CENTRAL"], "CENTRAL"),
        shared("oxford circus", &["BAKERLOO", "CENTRAL", "VICTORIA"], "CENTRAL"),
        shared("bond street", &["CENTRAL", "JUBILEE", "ELIZABETH"], "CENTRAL"),
        shared("tottenham court road", &["CENTRAL", "NORTHERN", "ELIZABETH"], "CENTRAL"),
        shared("bank", &["CIRCLE", "CENTRAL", "NORTHERN", "WATERLOO_CITY"], "CENTRAL"),
        shared("liverpool street", &["CIRCLE", "CENTRAL", "METROPOLITAN", "HAMMERSMITH_CITY", "ELIZABETH"], "CENTRAL"),
        shared("south kensington", &["CIRCLE", "DISTRICT", "PICCADILLY"], "DISTRICT"),
        shared("gloucester road", &["CIRCLE", "DISTRICT", "PICCADILLY"], "DISTRICT"),
        shared("high street kensington", &["CIRCLE", "DISTRICT"], "DISTRICT"),
        shared("sloane square", &["CIRCLE", "DISTRICT"], "DISTRICT"),
    ]
}
