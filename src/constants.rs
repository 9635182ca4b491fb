pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 10;

pub const SESSION_COOKIE: &str = "session";

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";
pub const SHOPPING_LIST_TITLE: &str = "Список ингредиентов";

pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 200;
pub const TAG_NAME_MAX_LENGTH: usize = 100;
pub const TAG_SLUG_MAX_LENGTH: usize = 20;

pub const LIST_FORMATS: &[(&str, &str)] = &[("plain", "Plain text"), ("numbered", "Numbered list")];
