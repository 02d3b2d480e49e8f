pub mod admin;
pub mod instructor;
pub mod public;
pub mod student;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        public::register_school,
        public::login,
        public::me,
        admin::create_program,
        admin::list_programs,
        admin::update_program,
        admin::create_chapter,
        admin::list_chapters,
        admin::save_quiz,
        admin::get_quiz,
        admin::generate_quiz,
        admin::create_user,
        admin::list_users,
        admin::assign_instructor,
        admin::enroll,
        admin::complete_enrollment,
        admin::withdraw_enrollment,
        admin::student_transcript,
        instructor::list_students,
        instructor::student_info,
        instructor::student_transcript,
        instructor::record_practical,
        instructor::annotate,
        student::list_chapters,
        student::get_chapter,
        student::get_quiz,
        student::submit_quiz,
        student::record_ebook,
        student::record_video,
        student::transcript,
        student::chat,
    ),
    tags(
        (name = "public", description = "Registration and login"),
        (name = "admin", description = "Curriculum, users and enrollments"),
        (name = "instructor", description = "Practical sign-off and notes"),
        (name = "student", description = "Chapters, quizzes and progress"),
    )
)]
pub struct ApiDoc;
