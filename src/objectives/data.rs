use serde::{Deserialize, Serialize, Serializer};

pub type UserId = String;
pub type ObjectiveId = String;
pub type ItemId = String;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Objective {
    pub user_id: UserId,
    pub objective_id: ObjectiveId,
    pub title: String,
    pub done: bool,
    pub theme: String,
    pub is_archived: bool,
    pub is_locked: bool,
    pub is_showing: bool,
    pub is_showing_checked_grocery: bool,
    pub is_showing_checked_step: bool,
    pub is_showing_checked_medicine: bool,
    pub is_showing_checked_exercise: bool,
    pub pos: f64,
    pub tags: Vec<String>,
    /// RFC 3339 timestamp. Empty means the row predates the field.
    pub last_modified: String,
}

/// Closed set of item shapes, numbered the way clients send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ItemType {
    Step = 0,
    Wait = 1,
    Question = 2,
    Note = 3,
    Location = 4,
    Divider = 5,
    Grocery = 6,
    Medicine = 7,
    Exercise = 8,
    Link = 9,
    Fake = 10,
    Image = 11,
    House = 12,
}

impl ItemType {
    pub const ALL: [ItemType; 13] = [
        ItemType::Step,
        ItemType::Wait,
        ItemType::Question,
        ItemType::Note,
        ItemType::Location,
        ItemType::Divider,
        ItemType::Grocery,
        ItemType::Medicine,
        ItemType::Exercise,
        ItemType::Link,
        ItemType::Fake,
        ItemType::Image,
        ItemType::House,
    ];

    pub fn from_tag(tag: u64) -> Option<ItemType> {
        ItemType::ALL.iter().copied().find(|t| *t as u64 == tag)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Step {
    pub title: String,
    pub done: bool,
    pub importance: i64,
    pub auto_destroy: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Wait {
    pub title: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Question {
    pub statement: String,
    pub answer: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Note {
    pub text: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    pub title: String,
    pub url: String,
    pub is_showing_map: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Divider {
    pub title: String,
    pub is_open: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Grocery {
    pub title: String,
    pub is_checked: bool,
    pub quantity: f64,
    pub unit: String,
    pub good_price: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Medicine {
    pub title: String,
    pub is_checked: bool,
    pub quantity: f64,
    pub unit: String,
    pub purpose: String,
    pub components: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Exercise {
    pub title: String,
    pub is_done: bool,
    pub reps: i64,
    pub series: i64,
    pub max_weight: String,
    pub description: String,
    pub weekdays: Vec<i64>,
    pub last_done: String,
    pub body_images: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Link {
    pub title: String,
    pub link: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    pub title: String,
    pub name: String,
    pub size: i64,
    pub width: i64,
    pub height: i64,
    pub is_displaying: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct House {
    pub title: String,
}

/// Placeholder items carry nothing beyond the common fields.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Placeholder {}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ItemKind {
    Step(Step),
    Wait(Wait),
    Question(Question),
    Note(Note),
    Location(Location),
    Divider(Divider),
    Grocery(Grocery),
    Medicine(Medicine),
    Exercise(Exercise),
    Link(Link),
    Fake(Placeholder),
    Image(Image),
    House(House),
}

impl ItemKind {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemKind::Step(_) => ItemType::Step,
            ItemKind::Wait(_) => ItemType::Wait,
            ItemKind::Question(_) => ItemType::Question,
            ItemKind::Note(_) => ItemType::Note,
            ItemKind::Location(_) => ItemType::Location,
            ItemKind::Divider(_) => ItemType::Divider,
            ItemKind::Grocery(_) => ItemType::Grocery,
            ItemKind::Medicine(_) => ItemType::Medicine,
            ItemKind::Exercise(_) => ItemType::Exercise,
            ItemKind::Link(_) => ItemType::Link,
            ItemKind::Fake(_) => ItemType::Fake,
            ItemKind::Image(_) => ItemType::Image,
            ItemKind::House(_) => ItemType::House,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub item_id: ItemId,
    pub user_id_objective_id: String,
    pub pos: f64,
    /// RFC 3339 timestamp. Empty means the row predates the field.
    pub last_modified: String,
    pub kind: ItemKind,
}

impl Item {
    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "PascalCase")]
        struct Flat<'a> {
            item_id: &'a str,
            user_id_objective_id: &'a str,
            #[serde(rename = "Type")]
            item_type: u8,
            pos: f64,
            last_modified: &'a str,
            #[serde(flatten)]
            fields: &'a ItemKind,
        }

        Flat {
            item_id: &self.item_id,
            user_id_objective_id: &self.user_id_objective_id,
            item_type: self.item_type().tag(),
            pos: self.pos,
            last_modified: &self.last_modified,
            fields: &self.kind,
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveRef {
    pub objective_id: ObjectiveId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub user_id_objective_id: String,
    pub item_id: ItemId,
}

/// Client changes to merge into the server copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    pub objectives: Vec<Objective>,
    pub items: Vec<Item>,
    pub delete_objectives: Vec<ObjectiveRef>,
    pub delete_items: Vec<ItemRef>,
}

/// Every objective and item a user owns.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FullState {
    pub objectives: Vec<Objective>,
    pub items: Vec<Item>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectiveIdRequest {
    pub objective_id: ObjectiveId,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct ItemKeyRequest {
    pub user_id_objective_id: String,
    pub item_id: ItemId,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteResult {
    pub deleted: usize,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct BackupListResponse {
    pub backups: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
pub struct BackupResult {
    pub key: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub item_id: ItemId,
    pub file_name: String,
}

#[derive(Serialize, Debug)]
pub struct AttachmentUrl {
    pub url: String,
}
