pub mod task;
pub mod user;

pub use task::{
    AttendanceRequest, ChecklistItem, ChecklistItemRecord, NewChecklistItemRequest,
    NewPhotoRequest, NewTaskRequest, Task, TaskRecord, TaskStatus, ToggleChecklistItemRequest,
    UpdateTaskRequest,
};
pub use user::{RegisterUserRequest, UpdateLanguageRequest, User};
